// src/errors.rs

//! Crate-wide error types.
//!
//! - [`HttpExecError`] is what provisioning, validation and config loading
//!   return to the host. Any of these stops a handler from serving.
//! - [`ValidationError`] is the fail-closed result of `validate()`.
//! - [`ExecutionError`] is per request. It ends up in the JSON body of a
//!   500 response and never leaves the request/response cycle.
//! - [`ShutdownTimeout`] is only ever logged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpExecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation of command '{command}' failed: {source}")]
    Validation {
        command: String,
        #[source]
        source: ValidationError,
    },

    #[error("Handler lifecycle error: {0}")]
    Lifecycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reasons a provisioned command is refused before it may serve traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("executable is empty after placeholder substitution")]
    EmptyExecutable,

    #[error("timeout must not be negative (got {0}ms)")]
    InvalidTimeout(i64),

    #[error("`at` events are only allowed on commands with route_scoped = false")]
    EventsOnRoute,
}

/// Per-invocation failure of a command.
///
/// The `Display` output is exactly what lands in the `error` field of the
/// response body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("placeholder resolution failed: {0}")]
    PlaceholderResolutionFailed(String),

    #[error("failed to start command: {0}")]
    SpawnFailed(String),

    #[error("timed out")]
    TimedOut,

    #[error("{message}")]
    NonZeroExit { code: Option<i32>, message: String },

    #[error("terminated during shutdown")]
    Terminated,

    #[error("handler is not ready")]
    NotReady,
}

/// Processes that were still alive when a shutdown grace period ran out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} process(es) still running after shutdown: {pids:?}", pids.len())]
pub struct ShutdownTimeout {
    pub pids: Vec<u32>,
}

pub type Result<T> = std::result::Result<T, HttpExecError>;
