//! Subprocess helpers shared by one-shot steps, services and the
//! foreground server.
//!
//! Children inherit the entrypoint's stdout/stderr so their output lands
//! in the container log unchanged.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use alibi_core::command::CommandSpec;
use tokio::process::{Child, Command};

use crate::error::SupervisorError;

/// Exit information for a finished one-shot process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, or `128 + signal` if the process was killed.
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Build a [`Command`] for `spec` with inherited stdio.
///
/// `kill_on_drop(true)` makes sure a child whose handle is dropped (for
/// example on a step timeout) does not outlive the entrypoint.
pub fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Spawn `spec`, mapping spawn failures to [`SupervisorError::Spawn`].
pub fn spawn(spec: &CommandSpec) -> Result<Child, SupervisorError> {
    build_command(spec)
        .spawn()
        .map_err(|source| SupervisorError::Spawn {
            program: spec.program.clone(),
            source,
        })
}

/// Convert an [`ExitStatus`] into the shell convention exit code.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Run `spec` to completion, optionally bounded by `timeout`.
///
/// Returns `Ok(None)` when the timeout fires; the child is killed in that
/// case.
pub async fn run_to_completion(
    spec: &CommandSpec,
    timeout: Option<Duration>,
) -> Result<Option<ExitOutcome>, SupervisorError> {
    let start = Instant::now();
    let mut child = spawn(spec)?;

    let status = match timeout {
        Some(limit) => {
            let waited = tokio::time::timeout(limit, child.wait()).await;
            match waited {
                Ok(status) => status?,
                Err(_elapsed) => {
                    // Reap the child so it does not linger as a zombie.
                    let _ = child.kill().await;
                    return Ok(None);
                }
            }
        }
        None => child.wait().await?,
    };

    Ok(Some(ExitOutcome {
        exit_code: exit_code_of(status),
        duration_ms: start.elapsed().as_millis() as u64,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
