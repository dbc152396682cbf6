// src/exec/tracker.rs

//! Process-wide set of live child processes.
//!
//! Every process a runner spawns is tracked from spawn until it has been
//! reaped. Each entry carries a cancel channel; terminating an entry fires the
//! channel, and the runner that owns the `Child` performs the SIGTERM → grace
//! → SIGKILL sequence and reaps it. The tracker then waits for the entries to
//! disappear and, as a last resort, SIGKILLs whatever pid is still listed.
//!
//! The lock is only held for insert/remove/snapshot, never across an await.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::ShutdownTimeout;
use crate::exec::signal::{force_kill, is_process_alive};

/// Extra time granted on top of the grace period for runners to reap.
const REAP_SLACK: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Public view of a tracked process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProcess {
    pub id: u64,
    pub command: String,
    pub pid: Option<u32>,
}

#[derive(Debug)]
struct Entry {
    command: String,
    pid: Option<u32>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Result of a terminate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Processes that were asked to stop.
    pub signalled: usize,
    /// Pids still alive when the pass gave up.
    pub leftover: Vec<u32>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.leftover.is_empty()
    }

    /// Fold a later terminate pass into this one.
    pub fn absorb(&mut self, other: ShutdownReport) {
        self.signalled += other.signalled;
        self.leftover.extend(other.leftover);
    }

    pub fn into_result(self) -> Result<usize, ShutdownTimeout> {
        if self.leftover.is_empty() {
            Ok(self.signalled)
        } else {
            Err(ShutdownTimeout {
                pids: self.leftover,
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct ProcessTracker {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Entry>>,
}

/// Removes its entry from the tracker when dropped.
#[derive(Debug)]
pub(crate) struct TrackGuard {
    tracker: Arc<ProcessTracker>,
    id: u64,
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        self.tracker.entries().remove(&self.id);
    }
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a freshly spawned process.
    ///
    /// The returned receiver fires when the process should be terminated.
    pub(crate) fn track(
        self: &Arc<Self>,
        command: &str,
        pid: Option<u32>,
    ) -> (TrackGuard, oneshot::Receiver<()>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.entries().insert(
            id,
            Entry {
                command: command.to_string(),
                pid,
                cancel: Some(cancel_tx),
            },
        );
        debug!(command = %command, pid = ?pid, tracked_id = id, "tracking process");
        (
            TrackGuard {
                tracker: Arc::clone(self),
                id,
            },
            cancel_rx,
        )
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn snapshot(&self) -> Vec<TrackedProcess> {
        let mut out: Vec<TrackedProcess> = self
            .entries()
            .iter()
            .map(|(id, e)| TrackedProcess {
                id: *id,
                command: e.command.clone(),
                pid: e.pid,
            })
            .collect();
        out.sort_by_key(|p| p.id);
        out
    }

    /// Pids of live processes started for `command`.
    pub fn pids_for(&self, command: &str) -> Vec<u32> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.command == command)
            .filter_map(|p| p.pid)
            .collect()
    }

    /// Terminate every tracked process.
    pub async fn terminate_all(&self, grace: Duration) -> ShutdownReport {
        self.terminate_where(|_| true, grace).await
    }

    /// Terminate the processes started for one command.
    pub async fn terminate_command(&self, command: &str, grace: Duration) -> ShutdownReport {
        self.terminate_where(|c| c == command, grace).await
    }

    async fn terminate_where<F>(&self, matches: F, grace: Duration) -> ShutdownReport
    where
        F: Fn(&str) -> bool,
    {
        let targets: HashSet<u64> = {
            let mut live = self.entries();
            live.iter_mut()
                .filter(|(_, e)| matches(&e.command))
                .map(|(id, e)| {
                    if let Some(cancel) = e.cancel.take() {
                        // Receiver gone means the runner is already finishing.
                        let _ = cancel.send(());
                    }
                    *id
                })
                .collect()
        };

        if targets.is_empty() {
            return ShutdownReport::default();
        }
        info!(count = targets.len(), "terminating tracked processes");

        if !self.wait_released(&targets, grace + REAP_SLACK).await {
            for pid in self.tracked_pids(&targets) {
                warn!(pid, "process still tracked after grace period; force killing");
                force_kill(pid);
            }
            self.wait_released(&targets, REAP_SLACK).await;
        }

        let leftover: Vec<u32> = self
            .tracked_pids(&targets)
            .into_iter()
            .filter(|pid| is_process_alive(*pid))
            .collect();

        ShutdownReport {
            signalled: targets.len(),
            leftover,
        }
    }

    fn tracked_pids(&self, ids: &HashSet<u64>) -> Vec<u32> {
        self.entries()
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .filter_map(|(_, e)| e.pid)
            .collect()
    }

    /// Poll until none of `ids` is tracked any more, or `limit` elapses.
    async fn wait_released(&self, ids: &HashSet<u64>, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let pending = {
                let live = self.entries();
                ids.iter().any(|id| live.contains_key(id))
            };
            if !pending {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
