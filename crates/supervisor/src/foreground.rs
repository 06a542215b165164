//! The foreground process: the last step of startup.
//!
//! The entrypoint keeps running as the parent so it can keep supervising
//! background services. Termination signals it receives are forwarded to
//! the foreground child, and the child's exit code becomes the entrypoint's
//! own. [`exec_replace`] offers plain process replacement instead, for
//! containers that do not want supervision.

use std::future::Future;
use std::time::Duration;

use alibi_core::command::CommandSpec;
use tokio::process::Child;

use crate::error::SupervisorError;
use crate::process::{self, exit_code_of};
use crate::signal::{send_signal, Signal};

/// A spawned foreground process.
pub struct Foreground {
    child: Child,
    command: String,
}

impl Foreground {
    pub fn spawn(spec: &CommandSpec) -> Result<Self, SupervisorError> {
        let child = process::spawn(spec)?;
        let command = spec.to_string();
        tracing::info!(pid = child.id(), command = %command, "Foreground process started");
        Ok(Self { child, command })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit.
    ///
    /// If `shutdown` resolves first, its signal is forwarded to the child,
    /// which then has `grace` to exit before it is killed.
    pub async fn wait<F>(mut self, grace: Duration, shutdown: F) -> Result<i32, SupervisorError>
    where
        F: Future<Output = Signal>,
    {
        let status = tokio::select! {
            status = self.child.wait() => status?,
            signal = shutdown => {
                tracing::info!(
                    signal = signal.name(),
                    pid = self.pid(),
                    "Forwarding signal to foreground process",
                );
                if let Some(pid) = self.pid() {
                    if let Err(e) = send_signal(pid, signal) {
                        tracing::warn!(pid, error = %e, "Failed to forward signal");
                    }
                }

                let waited = tokio::time::timeout(grace, self.child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_elapsed) => {
                        tracing::warn!(
                            grace_ms = grace.as_millis() as u64,
                            "Foreground process did not exit in time, killing it",
                        );
                        self.child.kill().await?;
                        self.child.wait().await?
                    }
                }
            }
        };

        let exit_code = exit_code_of(status);
        if exit_code == 0 {
            tracing::info!(command = %self.command, "Foreground process exited");
        } else {
            tracing::warn!(command = %self.command, exit_code, "Foreground process exited with failure");
        }
        Ok(exit_code)
    }
}

/// Spawn `spec` and wait for it; see [`Foreground::wait`].
pub async fn run_foreground<F>(
    spec: &CommandSpec,
    grace: Duration,
    shutdown: F,
) -> Result<i32, SupervisorError>
where
    F: Future<Output = Signal>,
{
    Foreground::spawn(spec)?.wait(grace, shutdown).await
}

/// Replace the current process image with `spec`.
///
/// Only returns if the replacement failed. Any background children keep
/// running unsupervised under the new image.
#[cfg(unix)]
pub fn exec_replace(spec: &CommandSpec) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new(&spec.program);
    cmd.args(&spec.args);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    tracing::info!(command = %spec, "Replacing entrypoint with foreground process");
    cmd.exec()
}

#[cfg(not(unix))]
pub fn exec_replace(_spec: &CommandSpec) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process replacement is only supported on unix",
    )
}
