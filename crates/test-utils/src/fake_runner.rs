use std::sync::{Arc, Mutex};

use http_exec::exec::{BoxFuture, CommandRunner, ExecutionResult};
use http_exec::placeholder::RequestContext;
use http_exec::spec::CommandSpec;

/// One recorded call on the fake runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub request_path: Option<String>,
    pub detached: bool,
}

/// A fake runner that:
/// - records every invocation
/// - answers with a fixed result, without spawning anything.
#[derive(Clone)]
pub struct FakeRunner {
    result: ExecutionResult,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeRunner {
    pub fn succeeding() -> Self {
        Self::answering(ExecutionResult::Success)
    }

    pub fn answering(result: ExecutionResult) -> Self {
        Self {
            result,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count_for(&self, command: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.command == command)
            .count()
    }

    fn record(&self, spec: &CommandSpec, request: Option<&RequestContext>, detached: bool) {
        self.invocations.lock().unwrap().push(Invocation {
            command: spec.name.clone(),
            request_path: request.map(|r| r.path.clone()),
            detached,
        });
    }
}

impl CommandRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        request: Option<&'a RequestContext>,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            self.record(spec, request, false);
            self.result.clone()
        })
    }

    fn start(&self, spec: Arc<CommandSpec>, request: Option<RequestContext>) -> ExecutionResult {
        self.record(&spec, request.as_ref(), true);
        self.result.clone()
    }
}
