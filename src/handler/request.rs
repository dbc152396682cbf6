// src/handler/request.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::CommandConfig;
use crate::errors::{ExecutionError, HttpExecError, Result};
use crate::exec::{BoxFuture, CommandRunner, ExecutionResult, ShutdownReport};
use crate::handler::state::{AtomicState, HandlerState};
use crate::handler::{Lifecycle, ProvisionContext, ServeOutcome};
use crate::placeholder::RequestContext;
use crate::registry::AppRegistry;
use crate::spec::CommandSpec;

/// How long `cleanup` keeps sweeping for processes of requests that were
/// admitted just before the handler was cleaned up.
const ADMITTED_SWEEP_LIMIT: Duration = Duration::from_secs(1);
const SWEEP_INTERVAL: Duration = Duration::from_millis(20);

/// Runs one configured command per request.
///
/// After `validate` the handler is shared behind an `Arc` and `serve` may be
/// called from any number of requests at once. The spec is immutable and the
/// state is atomic, so no lock is held while a process runs.
pub struct RequestHandler {
    name: String,
    config: CommandConfig,
    state: AtomicState,
    /// Requests currently inside `serve`.
    admitted: AtomicUsize,
    spec: Option<Arc<CommandSpec>>,
    registry: Option<Arc<AppRegistry>>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl RequestHandler {
    pub fn new(name: impl Into<String>, config: CommandConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: AtomicState::new(HandlerState::Unprovisioned),
            admitted: AtomicUsize::new(0),
            spec: None,
            registry: None,
            runner: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HandlerState {
        self.state.get()
    }

    /// The built spec, once provisioned.
    pub fn spec(&self) -> Option<&Arc<CommandSpec>> {
        self.spec.as_ref()
    }

    /// Request path this handler answers on, if any.
    pub fn path(&self) -> Option<&str> {
        self.config.path.as_deref()
    }

    /// Terminate this handler's processes until no admitted request can
    /// still start one.
    ///
    /// A request increments `admitted` before it reads the state and
    /// `cleanup` flips the state before it reads `admitted` (both `SeqCst`),
    /// so once `admitted` is zero every process this handler will ever start
    /// is already tracked.
    async fn sweep(&self, registry: &AppRegistry) -> ShutdownReport {
        let tracker = registry.tracker();
        let grace = registry.grace_period();
        let mut report = tracker.terminate_command(&self.name, grace).await;

        let deadline = Instant::now() + grace + ADMITTED_SWEEP_LIMIT;
        while self.admitted.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    command = %self.name,
                    admitted = self.admitted.load(Ordering::SeqCst),
                    "requests still in flight after cleanup"
                );
                break;
            }
            tokio::time::sleep(SWEEP_INTERVAL).await;
            report.absorb(tracker.terminate_command(&self.name, grace).await);
        }
        report.absorb(tracker.terminate_command(&self.name, grace).await);
        report
    }

    async fn execute(&self, request: &RequestContext) -> ServeOutcome {
        let (Some(spec), Some(runner)) = (self.spec.as_ref(), self.runner.as_ref()) else {
            return ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady));
        };

        let result = if spec.foreground {
            runner.run(spec, Some(request)).await
        } else {
            runner.start(Arc::clone(spec), Some(request.clone()))
        };

        if spec.pass_thru && result.is_success() {
            ServeOutcome::Next
        } else {
            ServeOutcome::Respond(result)
        }
    }
}

impl Lifecycle for RequestHandler {
    fn provision(&mut self, ctx: &ProvisionContext) -> Result<()> {
        let state = self.state.get();
        if !matches!(
            state,
            HandlerState::Unprovisioned | HandlerState::Provisioned
        ) {
            return Err(HttpExecError::Lifecycle(format!(
                "cannot provision handler '{}' in state {state}",
                self.name
            )));
        }

        let spec = Arc::new(CommandSpec::build(
            &self.name,
            &self.config,
            ctx.default_timeout_ms,
        )?);

        // Only non-routes are added to the registry.
        if !spec.is_route() {
            ctx.registry.register(Arc::clone(&spec));
        }

        debug!(command = %self.name, route = spec.is_route(), "provisioned handler");
        self.spec = Some(spec);
        self.registry = Some(Arc::clone(&ctx.registry));
        self.runner = Some(Arc::clone(&ctx.runner));
        self.state.set(HandlerState::Provisioned);
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let state = self.state.get();
        match state {
            HandlerState::Provisioned => {}
            HandlerState::Validated | HandlerState::Serving => return Ok(()),
            other => {
                return Err(HttpExecError::Lifecycle(format!(
                    "cannot validate handler '{}' in state {other}",
                    self.name
                )));
            }
        }

        let Some(spec) = self.spec.as_ref() else {
            return Err(HttpExecError::Lifecycle(format!(
                "handler '{}' has no spec",
                self.name
            )));
        };

        spec.validate().map_err(|source| HttpExecError::Validation {
            command: self.name.clone(),
            source,
        })?;

        if spec.is_route() && spec.timeout().is_none() {
            warn!(
                command = %self.name,
                "route command has no timeout; a request may hold a process indefinitely"
            );
        }

        self.state.set(HandlerState::Validated);
        Ok(())
    }

    fn serve<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, ServeOutcome> {
        Box::pin(async move {
            let _admitted = Admitted::enter(&self.admitted);
            let state = self.state.get();
            if !state.can_serve() {
                warn!(command = %self.name, %state, "request for handler that is not ready");
                return ServeOutcome::Respond(ExecutionResult::Failure(ExecutionError::NotReady));
            }
            if state == HandlerState::Validated {
                // Losing the race to another request is fine.
                let _ = self
                    .state
                    .advance(HandlerState::Validated, HandlerState::Serving);
            }

            self.execute(request).await
        })
    }

    fn cleanup(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let previous = self.state.replace(HandlerState::CleanedUp);
            if previous == HandlerState::CleanedUp {
                return Ok(());
            }

            let Some(registry) = self.registry.as_ref() else {
                return Ok(());
            };

            let report = self.sweep(registry).await;
            match report.into_result() {
                Ok(0) => debug!(command = %self.name, "handler cleaned up"),
                Ok(signalled) => info!(command = %self.name, signalled, "handler cleaned up"),
                Err(e) => warn!(command = %self.name, error = %e, "handler cleanup left processes"),
            }
            Ok(())
        })
    }
}

/// Counts a request as admitted for as long as it is alive.
struct Admitted<'a>(&'a AtomicUsize);

impl<'a> Admitted<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Admitted<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
