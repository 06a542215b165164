//! Executes a [`StartupPlan`] in its fixed order.
//!
//! [`Sequencer::prepare`] covers everything up to the foreground step:
//! the readiness gate, migration (fatal), static asset collection (best
//! effort) and the background launches. [`Sequencer::run`] adds the
//! foreground process and stops the background services once it exits.
//!
//! Progress is published on a watch channel so the status endpoint can
//! report which step the container is on.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alibi_core::command::CommandSpec;
use alibi_core::readiness::WaitPolicy;
use alibi_core::restart::RestartPolicy;
use alibi_core::startup::{
    PlannedStep, StartupPlan, StepKind, StepMode, StepOutcome, StepReport,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;
use crate::foreground::Foreground;
use crate::probe;
use crate::registry::Supervisor;
use crate::service::{ServiceSpec, DEFAULT_STOP_GRACE};
use crate::signal::Signal;
use crate::steps;

// ---------------------------------------------------------------------------
// Options and progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    pub wait: WaitPolicy,
    /// Limit for each one-shot step. `None` lets them run indefinitely.
    pub step_timeout: Option<Duration>,
    pub restart: RestartPolicy,
    /// SIGTERM-to-SIGKILL grace for background services and the foreground.
    pub stop_grace: Duration,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            step_timeout: None,
            restart: RestartPolicy::default(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StartupPhase {
    Preparing,
    Serving,
    Finished { exit_code: i32 },
    Aborted { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupSnapshot {
    #[serde(flatten)]
    pub phase: StartupPhase,
    pub steps: Vec<StepReport>,
}

/// Everything up to the foreground step has run.
#[derive(Debug)]
pub struct Prepared {
    pub reports: Vec<StepReport>,
    pub foreground_kind: StepKind,
    pub foreground: CommandSpec,
}

#[derive(Debug)]
pub struct SequenceResult {
    pub exit_code: i32,
    pub reports: Vec<StepReport>,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct Sequencer {
    plan: StartupPlan,
    options: SequencerOptions,
    supervisor: Arc<Supervisor>,
    progress: watch::Sender<StartupSnapshot>,
}

impl Sequencer {
    /// Validate `plan` and build a sequencer with its own [`Supervisor`].
    pub fn new(plan: StartupPlan, options: SequencerOptions) -> Result<Self, SupervisorError> {
        plan.validate()?;
        options.wait.validate()?;
        let (progress, _) = watch::channel(StartupSnapshot {
            phase: StartupPhase::Preparing,
            steps: Vec::new(),
        });
        Ok(Self {
            plan,
            options,
            supervisor: Arc::new(Supervisor::new()),
            progress,
        })
    }

    /// Launch background services into a shared registry instead.
    pub fn with_supervisor(mut self, supervisor: Arc<Supervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn supervisor(&self) -> Arc<Supervisor> {
        Arc::clone(&self.supervisor)
    }

    pub fn subscribe(&self) -> watch::Receiver<StartupSnapshot> {
        self.progress.subscribe()
    }

    pub fn plan(&self) -> &StartupPlan {
        &self.plan
    }

    /// Run every step before the foreground one.
    ///
    /// A fatal failure aborts immediately: later steps never run.
    pub async fn prepare(&self, cancel: &CancellationToken) -> Result<Prepared, SupervisorError> {
        let mut reports = Vec::new();
        tracing::info!(role = self.plan.role.as_str(), "Starting container sequence");

        for step in self.plan.steps() {
            if step.mode == StepMode::Foreground {
                let foreground = step
                    .command
                    .ok_or_else(|| SupervisorError::InvalidPlan(missing_foreground(step.kind)))?;
                return Ok(Prepared {
                    reports,
                    foreground_kind: step.kind,
                    foreground,
                });
            }

            match self.execute(&step, cancel).await {
                Ok(report) => {
                    self.record(report.clone());
                    reports.push(report);
                }
                Err(e) => {
                    self.record(StepReport::new(
                        step.kind,
                        StepOutcome::Failed {
                            reason: e.to_string(),
                        },
                        0,
                    ));
                    self.set_phase(StartupPhase::Aborted {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        // `StartupPlan::steps` always ends with the foreground step.
        Err(SupervisorError::InvalidPlan(missing_foreground(
            self.plan.foreground_kind(),
        )))
    }

    /// Prepare, run the foreground process, then stop background services.
    ///
    /// `shutdown` is the entrypoint's termination signal. Before the
    /// foreground starts it aborts startup; afterwards it is forwarded to
    /// the foreground process.
    pub async fn run<F>(
        &self,
        cancel: &CancellationToken,
        shutdown: F,
    ) -> Result<SequenceResult, SupervisorError>
    where
        F: Future<Output = Signal>,
    {
        tokio::pin!(shutdown);

        let prepared = tokio::select! {
            result = self.prepare(cancel) => result,
            signal = &mut shutdown => {
                tracing::warn!(signal = signal.name(), "Shutdown requested during startup");
                cancel.cancel();
                self.set_phase(StartupPhase::Aborted {
                    reason: format!("received {}", signal.name()),
                });
                Err(SupervisorError::Cancelled)
            }
        };

        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.supervisor.shutdown_all().await;
                return Err(e);
            }
        };

        let mut reports = prepared.reports;
        let start = Instant::now();

        let foreground = match Foreground::spawn(&prepared.foreground) {
            Ok(fg) => fg,
            Err(e) => {
                self.record(StepReport::new(
                    prepared.foreground_kind,
                    StepOutcome::Failed {
                        reason: e.to_string(),
                    },
                    0,
                ));
                self.set_phase(StartupPhase::Aborted {
                    reason: e.to_string(),
                });
                self.supervisor.shutdown_all().await;
                return Err(e);
            }
        };

        let launched = StepReport::new(prepared.foreground_kind, StepOutcome::Succeeded, 0);
        self.record(launched.clone());
        self.set_phase(StartupPhase::Serving);

        let result = foreground.wait(self.options.stop_grace, shutdown).await;
        self.supervisor.shutdown_all().await;

        let exit_code = match result {
            Ok(code) => code,
            Err(e) => {
                self.set_phase(StartupPhase::Aborted {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let finished = StepReport {
            duration_ms: start.elapsed().as_millis() as u64,
            ..launched
        };
        self.progress.send_modify(|snapshot| {
            if let Some(last) = snapshot.steps.last_mut() {
                *last = finished.clone();
            }
        });
        reports.push(finished);
        self.set_phase(StartupPhase::Finished { exit_code });

        Ok(SequenceResult { exit_code, reports })
    }

    async fn execute(
        &self,
        step: &PlannedStep,
        cancel: &CancellationToken,
    ) -> Result<StepReport, SupervisorError> {
        match step.mode {
            StepMode::Gate => {
                if self.plan.dependencies.is_empty() {
                    return Ok(StepReport::new(step.kind, StepOutcome::Skipped, 0));
                }
                let start = Instant::now();
                probe::wait_for_all(&self.plan.dependencies, &self.options.wait, cancel).await?;
                Ok(StepReport::new(
                    step.kind,
                    StepOutcome::Succeeded,
                    start.elapsed().as_millis() as u64,
                ))
            }
            StepMode::OneShot => {
                let run = steps::run_step(
                    step.kind,
                    step.command.as_ref(),
                    step.policy,
                    self.options.step_timeout,
                );
                tokio::select! {
                    _ = cancel.cancelled() => Err(SupervisorError::Cancelled),
                    result = run => result,
                }
            }
            StepMode::Background => {
                let Some(command) = step.command.clone() else {
                    return Ok(StepReport::new(step.kind, StepOutcome::Skipped, 0));
                };
                let spec = ServiceSpec::new(service_name(step.kind), command)
                    .with_restart(self.options.restart.clone())
                    .with_stop_grace(self.options.stop_grace);
                let outcome = match self.supervisor.launch(spec).await {
                    Ok(()) => StepOutcome::Succeeded,
                    Err(e) => {
                        tracing::warn!(step = step.kind.as_str(), error = %e, "Background launch failed, continuing");
                        StepOutcome::Degraded {
                            reason: e.to_string(),
                        }
                    }
                };
                Ok(StepReport::new(step.kind, outcome, 0))
            }
            StepMode::Foreground => Err(SupervisorError::InvalidPlan(missing_foreground(step.kind))),
        }
    }

    fn record(&self, report: StepReport) {
        self.progress.send_modify(|snapshot| snapshot.steps.push(report));
    }

    fn set_phase(&self, phase: StartupPhase) {
        self.progress.send_modify(|snapshot| snapshot.phase = phase);
    }
}

/// Name a background service after the step that launches it.
fn service_name(kind: StepKind) -> &'static str {
    match kind {
        StepKind::LaunchWorker => "worker",
        StepKind::LaunchScheduler => "scheduler",
        StepKind::LaunchServer => "server",
        other => other.as_str(),
    }
}

fn missing_foreground(kind: StepKind) -> alibi_core::error::CoreError {
    alibi_core::error::CoreError::Validation(format!(
        "no command configured for foreground step '{}'",
        kind.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_follow_the_launch_step() {
        assert_eq!(service_name(StepKind::LaunchWorker), "worker");
        assert_eq!(service_name(StepKind::LaunchScheduler), "scheduler");
    }

    #[test]
    fn new_rejects_a_plan_without_foreground() {
        let plan = StartupPlan::default();
        assert!(matches!(
            Sequencer::new(plan, SequencerOptions::default()),
            Err(SupervisorError::InvalidPlan(_))
        ));
    }

    #[test]
    fn snapshot_serializes_phase_inline() {
        let snapshot = StartupSnapshot {
            phase: StartupPhase::Finished { exit_code: 3 },
            steps: vec![],
        };
        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(json["phase"], "finished");
        assert_eq!(json["exit_code"], 3);
        assert!(json["steps"].as_array().expect("array").is_empty());
    }
}
