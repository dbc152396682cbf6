// src/handler/mod.rs

//! Request-facing adapter.
//!
//! The host drives a handler through one explicit interface, [`Lifecycle`]:
//!
//! 1. `provision` builds the `CommandSpec` and registers it with the
//!    [`AppRegistry`] unless it is route-scoped,
//! 2. `validate` fails closed; a handler that did not validate never serves,
//! 3. `serve` runs once per request, concurrently,
//! 4. `cleanup` terminates whatever the handler still has running.
//!
//! Calling `serve` before `validate` succeeded is a host bug. It is answered
//! with a 500 `handler is not ready` body rather than defended against.

pub mod request;
pub mod state;

use std::sync::Arc;

use crate::errors::Result;
use crate::exec::{BoxFuture, CommandRunner, ExecutionResult};
use crate::placeholder::RequestContext;
use crate::registry::AppRegistry;

pub use request::RequestHandler;
pub use state::HandlerState;

/// Everything a handler needs from the host at provision time.
#[derive(Clone)]
pub struct ProvisionContext {
    pub registry: Arc<AppRegistry>,
    pub runner: Arc<dyn CommandRunner>,
    /// Applied to commands without their own `timeout`. `0` means no limit.
    pub default_timeout_ms: i64,
}

/// What the host should do after `serve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Write `result.body()` as JSON with `result.http_status()`.
    Respond(ExecutionResult),
    /// The command succeeded and the handler passes the request on to the
    /// next handler in the host's chain.
    Next,
}

/// Host-facing lifecycle of a request handler.
pub trait Lifecycle: Send + Sync {
    fn provision(&mut self, ctx: &ProvisionContext) -> Result<()>;

    fn validate(&mut self) -> Result<()>;

    fn serve<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, ServeOutcome>;

    fn cleanup(&self) -> BoxFuture<'_, Result<()>>;
}
