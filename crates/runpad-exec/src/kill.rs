//! Forceful process-tree termination.
//!
//! ## Overview
//!
//! Launched processes may start children of their own, so stopping a job kills the whole tree:
//! - On **Unix** every job is spawned as the leader of a fresh process group
//!   ([`isolate_process_group`]) and the group is sent `SIGKILL` with `killpg`.
//! - On **Windows** `taskkill /F /T` walks and kills the tree.
//!
//! When the tree kill fails the direct child is still killed.
use std::io;

use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

/// Prepare `cmd` so the spawned process can later be killed together with its descendants.
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Forcefully terminate `child` and every process it spawned.
///
/// Does not wait for the exit; the owner still reaps the child. A child that has already
/// been reaped has no pid and nothing is signalled.
pub async fn terminate_process_tree(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        trace!(target: "runpad.exec.kill", "child already reaped; nothing to kill");
        return Ok(());
    };

    debug!(target: "runpad.exec.kill", pid, "killing process tree");
    if let Err(e) = platform::kill_tree(pid).await {
        warn!(target: "runpad.exec.kill", pid, error = %e, "tree kill failed; killing direct child");
        return child.start_kill();
    }
    Ok(())
}

#[cfg(unix)]
mod platform {
    use std::io;

    pub async fn kill_tree(pid: u32) -> io::Result<()> {
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            // group already gone
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use std::{io, process::Stdio};

    use tokio::process::Command;

    pub async fn kill_tree(pid: u32) -> io::Result<()> {
        let status = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill exited with {status}")))
        }
    }
}
