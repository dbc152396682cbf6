// src/exec/runner.rs

//! Pluggable runner abstraction.
//!
//! The handler and the registry talk to a `CommandRunner` instead of
//! spawning processes directly. Production code uses
//! [`ProcessRunner`](super::ProcessRunner); tests provide their own
//! implementation that records invocations and answers immediately.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::exec::result::ExecutionResult;
use crate::placeholder::RequestContext;
use crate::spec::CommandSpec;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstracting how a command spec is executed.
///
/// `request` is `None` when the command runs outside a request (lifecycle
/// events); `http.request.*` placeholders then fail to resolve.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion (or timeout) and report the outcome.
    ///
    /// Exactly one execution attempt per call; no retries.
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        request: Option<&'a RequestContext>,
    ) -> BoxFuture<'a, ExecutionResult>;

    /// Start the command and return as soon as the process is running.
    ///
    /// Only placeholder and spawn failures are reported; the rest of the run
    /// (timeout, exit status) is observed in the background and logged.
    fn start(&self, spec: Arc<CommandSpec>, request: Option<RequestContext>) -> ExecutionResult;
}
