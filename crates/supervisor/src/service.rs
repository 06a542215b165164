//! Supervised background services (task worker, periodic scheduler).
//!
//! [`ServiceHandle::start`] spawns a supervision task that owns the child
//! process. The task restarts the process according to its
//! [`RestartPolicy`] and publishes every state change on a watch channel,
//! so crashes are visible instead of silently lost. Dropping the handle
//! does not stop the service; call [`ServiceHandle::stop`].

use std::time::{Duration, Instant};

use alibi_core::command::CommandSpec;
use alibi_core::restart::{RestartDecision, RestartPolicy};
use alibi_core::service_state::ServiceState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::process::{self, exit_code_of};
use crate::signal;

/// Exit code recorded when the program could not be spawned at all.
const SPAWN_FAILED_EXIT_CODE: i32 = 127;

/// Default time a service gets to exit after SIGTERM.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub command: CommandSpec,
    pub restart: RestartPolicy,
    pub stop_grace: Duration,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command,
            restart: RestartPolicy::default(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Point-in-time view of a service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub pid: Option<u32>,
    /// Total restarts performed since the service was launched.
    pub restarts: u32,
    pub last_exit_code: Option<i32>,
    /// When the service entered `state`.
    pub since: DateTime<Utc>,
}

impl ServiceStatus {
    fn starting() -> Self {
        Self {
            state: ServiceState::Starting,
            pid: None,
            restarts: 0,
            last_exit_code: None,
            since: Utc::now(),
        }
    }
}

/// Lifecycle handle for one supervised service.
pub struct ServiceHandle {
    name: String,
    status_rx: watch::Receiver<ServiceStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Start supervising `spec`. Returns immediately.
    pub fn start(spec: ServiceSpec) -> Self {
        Self::start_with_parent(spec, &CancellationToken::new())
    }

    /// Start supervising `spec`; cancelling `parent` stops the service.
    pub fn start_with_parent(spec: ServiceSpec, parent: &CancellationToken) -> Self {
        let (status_tx, status_rx) = watch::channel(ServiceStatus::starting());
        let cancel = parent.child_token();
        let name = spec.name.clone();
        let task = tokio::spawn(supervise(spec, status_tx, cancel.clone()));

        Self {
            name,
            status_rx,
            cancel,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ServiceStatus {
        self.status_rx.borrow().clone()
    }

    /// The supervision task is running and the service has not given up.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished() && self.status_rx.borrow().state.is_healthy()
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }

    /// Stop the service (SIGTERM, then SIGKILL after the grace period)
    /// and return its final status.
    pub async fn stop(self) -> ServiceStatus {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(service = %self.name, error = %e, "Supervision task panicked");
        }
        let status = self.status_rx.borrow().clone();
        status
    }
}

/// Publishes status transitions and keeps the restart tally.
struct Reporter {
    tx: watch::Sender<ServiceStatus>,
    restarts: u32,
}

impl Reporter {
    fn publish(&self, state: ServiceState, pid: Option<u32>, last_exit_code: Option<i32>) {
        self.tx.send_replace(ServiceStatus {
            state,
            pid,
            restarts: self.restarts,
            last_exit_code,
            since: Utc::now(),
        });
    }
}

async fn supervise(
    spec: ServiceSpec,
    status_tx: watch::Sender<ServiceStatus>,
    cancel: CancellationToken,
) {
    let name = spec.name.as_str();
    let mut reporter = Reporter {
        tx: status_tx,
        restarts: 0,
    };
    let mut consecutive = 0u32;
    let mut last_exit_code = None;

    loop {
        reporter.publish(ServiceState::Starting, None, last_exit_code);
        let started = Instant::now();

        let exit_code = match process::spawn(&spec.command) {
            Ok(mut child) => {
                let pid = child.id();
                reporter.publish(ServiceState::Running, pid, last_exit_code);
                tracing::info!(service = name, pid, command = %spec.command, "Service started");

                tokio::select! {
                    _ = cancel.cancelled() => {
                        let code = match signal::terminate(&mut child, spec.stop_grace).await {
                            Ok(status) => Some(exit_code_of(status)),
                            Err(e) => {
                                tracing::error!(service = name, error = %e, "Failed to stop service");
                                None
                            }
                        };
                        reporter.publish(ServiceState::Stopped, None, code.or(last_exit_code));
                        tracing::info!(service = name, exit_code = code, "Service stopped");
                        return;
                    }
                    status = child.wait() => match status {
                        Ok(status) => exit_code_of(status),
                        Err(e) => {
                            tracing::error!(service = name, error = %e, "Failed to wait for service");
                            -1
                        }
                    },
                }
            }
            Err(e) => {
                tracing::error!(service = name, error = %e, "Failed to spawn service");
                SPAWN_FAILED_EXIT_CODE
            }
        };

        last_exit_code = Some(exit_code);
        let uptime = started.elapsed();
        if spec.restart.resets_counter(uptime) {
            consecutive = 0;
        }

        let success = exit_code == 0;
        if success {
            tracing::info!(service = name, uptime_ms = uptime.as_millis() as u64, "Service exited");
        } else {
            tracing::warn!(
                service = name,
                exit_code,
                uptime_ms = uptime.as_millis() as u64,
                "Service exited with failure",
            );
        }

        match spec.restart.decide(success, consecutive) {
            RestartDecision::GiveUp => {
                let state = if success {
                    ServiceState::Exited
                } else {
                    tracing::error!(
                        service = name,
                        exit_code,
                        restarts = reporter.restarts,
                        policy = spec.restart.mode.as_str(),
                        "Service failed and will not be restarted",
                    );
                    ServiceState::Failed
                };
                reporter.publish(state, None, last_exit_code);
                return;
            }
            RestartDecision::Restart { delay } => {
                reporter.publish(ServiceState::BackingOff, None, last_exit_code);
                tracing::info!(
                    service = name,
                    delay_ms = delay.as_millis() as u64,
                    attempt = consecutive + 1,
                    "Restarting service after backoff",
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        reporter.publish(ServiceState::Stopped, None, last_exit_code);
                        tracing::info!(service = name, "Service stopped during backoff");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                consecutive += 1;
                reporter.restarts += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
