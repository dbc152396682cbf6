// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands described by
//! a [`CommandSpec`](crate::spec::CommandSpec), using `tokio::process::Command`.
//!
//! - [`runner`] defines the `CommandRunner` trait the handler talks to, so
//!   tests can replace process execution with a fake.
//! - [`process`] is the production `ProcessRunner`: placeholder resolution,
//!   spawn, timeout race, stderr capture.
//! - [`tracker`] is the process-wide set of live children that shutdown and
//!   cleanup terminate.
//! - [`signal`] holds the SIGTERM → grace → SIGKILL escalation.
//! - [`result`] is the per-invocation outcome and its JSON body.

pub mod process;
pub mod result;
pub mod runner;
pub mod signal;
pub mod tracker;

pub use process::ProcessRunner;
pub use result::{ExecutionResult, ResponseBody};
pub use runner::{BoxFuture, CommandRunner};
pub use signal::is_process_alive;
pub use tracker::{ProcessTracker, ShutdownReport, TrackedProcess};
