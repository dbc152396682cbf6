// src/exec/process.rs

//! Production runner: one OS process per invocation.

use std::collections::{BTreeMap, VecDeque};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ExecutionError;
use crate::exec::result::ExecutionResult;
use crate::exec::runner::{BoxFuture, CommandRunner};
use crate::exec::signal::terminate;
use crate::exec::tracker::{ProcessTracker, TrackGuard};
use crate::placeholder::{self, RequestContext};
use crate::spec::CommandSpec;

/// Number of stderr lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;
/// How long to wait for stderr to drain after the process exited. A
/// backgrounded grandchild can hold the pipe open indefinitely.
const STDERR_SETTLE: Duration = Duration::from_millis(100);

/// Runs commands as child processes, registering each in the shared
/// [`ProcessTracker`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tracker: Arc<ProcessTracker>,
    grace: Duration,
}

/// Arguments and environment after per-request substitution.
#[derive(Debug)]
struct Prepared {
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

/// A spawned, tracked process whose outcome has not been observed yet.
struct Launched {
    command: String,
    pid: Option<u32>,
    child: Child,
    cancel: oneshot::Receiver<()>,
    stderr: Arc<Mutex<VecDeque<String>>>,
    stderr_task: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    grace: Duration,
    started: Instant,
    // Dropped last: the entry disappears only after the child was reaped.
    _guard: TrackGuard,
}

impl ProcessRunner {
    pub fn new(tracker: Arc<ProcessTracker>, grace: Duration) -> Self {
        Self { tracker, grace }
    }

    pub fn tracker(&self) -> &Arc<ProcessTracker> {
        &self.tracker
    }

    fn prepare(
        spec: &CommandSpec,
        request: Option<&RequestContext>,
    ) -> Result<Prepared, ExecutionError> {
        let resolve = |template: &str| {
            placeholder::resolve(template, request)
                .map_err(|e| ExecutionError::PlaceholderResolutionFailed(e.to_string()))
        };

        let args = spec
            .args
            .iter()
            .map(|a| resolve(a))
            .collect::<Result<Vec<_>, _>>()?;

        let env = spec
            .env
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve(v)?)))
            .collect::<Result<BTreeMap<_, _>, ExecutionError>>()?;

        Ok(Prepared { args, env })
    }

    fn launch(
        &self,
        spec: &CommandSpec,
        request: Option<&RequestContext>,
    ) -> Result<Launched, ExecutionError> {
        let prepared = Self::prepare(spec, request)?;

        let mut cmd = Command::new(&spec.executable);
        cmd.args(&prepared.args)
            .envs(&prepared.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = spec.dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {e}", spec.executable)))?;

        let pid = child.id();
        let (guard, cancel) = self.tracker.track(&spec.name, pid);

        info!(
            command = %spec.name,
            executable = %spec.executable,
            args = ?prepared.args,
            pid = ?pid,
            "started process"
        );

        if let Some(stdout) = child.stdout.take() {
            spawn_stdout_drain(spec.name.clone(), stdout);
        }

        let stderr = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| spawn_stderr_tail(spec.name.clone(), pipe, Arc::clone(&stderr)));

        Ok(Launched {
            command: spec.name.clone(),
            pid,
            child,
            cancel,
            stderr,
            stderr_task,
            timeout: spec.timeout(),
            grace: self.grace,
            started: Instant::now(),
            _guard: guard,
        })
    }
}

impl Launched {
    /// Wait for exit, timeout or cancellation, whichever comes first.
    async fn finish(mut self) -> Result<(), ExecutionError> {
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            status = self.child.wait() => {
                match status {
                    Ok(status) => self.exit_outcome(status).await,
                    Err(e) => Err(ExecutionError::NonZeroExit {
                        code: None,
                        message: format!("waiting for process failed: {e}"),
                    }),
                }
            }

            _ = deadline => {
                warn!(
                    command = %self.command,
                    pid = ?self.pid,
                    timeout_ms = timeout.map(|t| t.as_millis() as u64),
                    "process timed out; terminating"
                );
                terminate(&mut self.child, &self.command, self.grace).await;
                Err(ExecutionError::TimedOut)
            }

            Ok(()) = &mut self.cancel => {
                info!(command = %self.command, pid = ?self.pid, "terminating process for shutdown");
                terminate(&mut self.child, &self.command, self.grace).await;
                Err(ExecutionError::Terminated)
            }
        };

        debug!(
            command = %self.command,
            pid = ?self.pid,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            success = outcome.is_ok(),
            "process finished"
        );
        outcome
    }

    async fn exit_outcome(&mut self, status: ExitStatus) -> Result<(), ExecutionError> {
        let code = status.code();
        info!(
            command = %self.command,
            pid = ?self.pid,
            exit_code = ?code,
            success = status.success(),
            "process exited"
        );
        if status.success() {
            return Ok(());
        }

        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_SETTLE, task).await;
        }
        let tail = {
            let lines = self.stderr.lock().unwrap_or_else(|p| p.into_inner());
            lines.iter().cloned().collect::<Vec<_>>().join("\n")
        };

        let message = if !tail.trim().is_empty() {
            tail.trim().to_string()
        } else {
            describe_status(&status)
        };
        Err(ExecutionError::NonZeroExit { code, message })
    }
}

fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return format!("killed by signal {sig}");
        }
    }
    "process exited abnormally".to_string()
}

/// Consume stdout so the pipe never fills; log lines at debug.
fn spawn_stdout_drain<R>(command: String, pipe: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(command = %command, "stdout: {}", line);
        }
    });
}

/// Consume stderr, keeping the last few lines for the failure message.
fn spawn_stderr_tail<R>(
    command: String,
    pipe: R,
    tail: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(command = %command, "stderr: {}", line);
            let mut buf = tail.lock().unwrap_or_else(|p| p.into_inner());
            if buf.len() == STDERR_TAIL_LINES {
                buf.pop_front();
            }
            buf.push_back(line);
        }
    })
}

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        request: Option<&'a RequestContext>,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            // The wait runs in its own task: dropping the request future
            // (client went away) must not drop the `Child`. Timeout and
            // shutdown stay the only ways a command is stopped.
            let outcome = match self.launch(spec, request) {
                Ok(launched) => match tokio::spawn(launched.finish()).await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(ExecutionError::NonZeroExit {
                        code: None,
                        message: format!("process task failed: {e}"),
                    }),
                },
                Err(e) => Err(e),
            };
            if let Err(ref e) = outcome {
                warn!(command = %spec.name, error = %e, "command failed");
            }
            ExecutionResult::from(outcome)
        })
    }

    fn start(&self, spec: Arc<CommandSpec>, request: Option<RequestContext>) -> ExecutionResult {
        let launched = match self.launch(&spec, request.as_ref()) {
            Ok(launched) => launched,
            Err(e) => {
                warn!(command = %spec.name, error = %e, "command failed to start");
                return ExecutionResult::Failure(e);
            }
        };

        tokio::spawn(async move {
            if let Err(e) = launched.finish().await {
                warn!(command = %spec.name, error = %e, "background command failed");
            }
        });
        ExecutionResult::Success
    }
}
