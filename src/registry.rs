// src/registry.rs

//! Application-wide registry of non-route commands.
//!
//! The embedding host builds exactly one `AppRegistry` and hands it (behind an
//! `Arc`) to every handler through the provision context. There is no global
//! instance.
//!
//! The registry owns the shared [`ProcessTracker`], which makes it the kill
//! switch for every process spawned by any handler.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::exec::{CommandRunner, ExecutionResult, ProcessTracker, ShutdownReport};
use crate::spec::CommandSpec;
use crate::types::LifecycleEvent;

#[derive(Debug)]
pub struct AppRegistry {
    commands: Mutex<BTreeMap<String, Arc<CommandSpec>>>,
    tracker: Arc<ProcessTracker>,
    grace: Duration,
    shut_down: AtomicBool,
}

impl AppRegistry {
    pub fn new(grace: Duration) -> Self {
        Self::with_tracker(Arc::new(ProcessTracker::new()), grace)
    }

    pub fn with_tracker(tracker: Arc<ProcessTracker>, grace: Duration) -> Self {
        Self {
            commands: Mutex::new(BTreeMap::new()),
            tracker,
            grace,
            shut_down: AtomicBool::new(false),
        }
    }

    fn commands(&self) -> MutexGuard<'_, BTreeMap<String, Arc<CommandSpec>>> {
        self.commands.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Add a non-route spec. Returns `true` if it was not registered before.
    ///
    /// Route-scoped specs are never added. Registration is keyed by spec
    /// name, so provisioning the same handler twice leaves one entry.
    pub fn register(&self, spec: Arc<CommandSpec>) -> bool {
        if spec.is_route() {
            debug!(command = %spec.name, "route-scoped command not registered");
            return false;
        }
        let mut commands = self.commands();
        if commands.contains_key(&spec.name) {
            return false;
        }
        info!(command = %spec.name, at = ?spec.at, "registered application command");
        commands.insert(spec.name.clone(), spec);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands().is_empty()
    }

    /// Registered specs that run at `event`, in name order.
    pub fn commands_at(&self, event: LifecycleEvent) -> Vec<Arc<CommandSpec>> {
        self.commands()
            .values()
            .filter(|spec| spec.runs_at(event))
            .cloned()
            .collect()
    }

    /// Run every command registered for `event`, one after the other.
    ///
    /// Failures are logged and counted; they never stop the remaining
    /// commands. Returns the number of failures.
    pub async fn run_event(&self, event: LifecycleEvent, runner: &dyn CommandRunner) -> usize {
        let specs = self.commands_at(event);
        if specs.is_empty() {
            return 0;
        }
        info!(%event, count = specs.len(), "running lifecycle commands");

        let mut failures = 0;
        for spec in specs {
            let result = if spec.foreground {
                runner.run(&spec, None).await
            } else {
                runner.start(Arc::clone(&spec), None)
            };
            if let ExecutionResult::Failure(e) = result {
                warn!(%event, command = %spec.name, error = %e, "lifecycle command failed");
                failures += 1;
            }
        }
        failures
    }

    pub async fn run_startup(&self, runner: &dyn CommandRunner) -> usize {
        self.run_event(LifecycleEvent::Startup, runner).await
    }

    /// Tear the registry down.
    ///
    /// Runs `shutdown` commands, then terminates every tracked process:
    /// SIGTERM, wait out the grace period, SIGKILL. Best-effort: leftover
    /// processes are logged, not returned as an error. Only the first call
    /// does anything.
    pub async fn shutdown(&self, runner: &dyn CommandRunner) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }

        self.run_event(LifecycleEvent::Shutdown, runner).await;

        let report = self.tracker.terminate_all(self.grace).await;
        match report.clone().into_result() {
            Ok(signalled) => info!(signalled, "registry shut down"),
            Err(e) => warn!(error = %e, "registry shut down with processes still running"),
        }
        report
    }
}
