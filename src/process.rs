//! External tools run in a process group of their own, so a timeout or a
//! cancelled request takes down everything the tool started, not only the
//! tool itself.

use crate::error::RetrievalError;
use std::{
    io,
    process::{Output, Stdio},
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, warn};

/// Sends SIGKILL to the child's whole process group when dropped.
struct GroupKill {
    tool: &'static str,
    pgid: Option<u32>,
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(self.tool, pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(tool: &'static str, pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory of ours.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        debug!(event = "tool_group_killed", tool, pgid);
    }
}

#[cfg(not(unix))]
fn kill_group(_tool: &'static str, _pgid: u32) {}

/// Runs `cmd` to completion under `limit`. The outer error is the timeout;
/// the inner one is a spawn or wait failure.
///
/// Whatever the outcome, including the returned future being dropped, no
/// process from the tool's group outlives the call.
pub async fn run_tool(
    mut cmd: Command,
    tool: &'static str,
    limit: Duration,
) -> Result<io::Result<Output>, RetrievalError> {
    cmd.kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return Ok(Err(err)),
    };
    let _group = GroupKill {
        tool,
        pgid: child.id(),
    };

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => Ok(result),
        Err(_) => {
            warn!(event = "tool_timeout", tool, limit_secs = limit.as_secs_f64());
            Err(RetrievalError::Timeout)
        }
    }
}

/// stderr, else stdout, else "no output".
pub fn tool_detail(stderr: &[u8], stdout: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    let (stderr, stdout) = (stderr.trim(), stdout.trim());
    if !stderr.is_empty() {
        stderr.to_string()
    } else if !stdout.is_empty() {
        stdout.to_string()
    } else {
        "no output".to_string()
    }
}
