// src/exec/signal.rs

//! Process termination: SIGTERM, wait out the grace period, then SIGKILL.
//!
//! Children are spawned as leaders of their own process group, so signals go
//! to the whole group first and then to the pid itself. That way a
//! `sh -c "..."` wrapper does not leave its grandchildren behind.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: libc::c_int) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    unsafe {
        let _ = libc::kill(-pid, signal);
        let _ = libc::kill(pid, signal);
    }
}

/// Last-resort kill for a pid whose owning runner did not reap it in time.
pub(crate) fn force_kill(pid: u32) {
    #[cfg(unix)]
    send_signal(pid, libc::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
}

/// Whether a process with this pid currently exists.
///
/// Always `false` on non-unix platforms.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Ask `child` to stop, escalating to a forceful kill after `grace`.
///
/// Returns once the child has been reaped (or could not be killed).
pub(crate) async fn terminate(child: &mut Child, command: &str, grace: Duration) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };

    #[cfg(unix)]
    send_signal(pid, libc::SIGTERM);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(command = %command, pid, ?status, "process exited after termination signal");
        }
        Ok(Err(e)) => {
            warn!(command = %command, pid, error = %e, "failed waiting for terminated process");
        }
        Err(_) => {
            warn!(
                command = %command,
                pid,
                grace_ms = grace.as_millis() as u64,
                "process ignored termination signal; killing"
            );
            #[cfg(unix)]
            send_signal(pid, libc::SIGKILL);
            if let Err(e) = child.kill().await {
                warn!(command = %command, pid, error = %e, "failed to kill process");
            }
        }
    }
}
