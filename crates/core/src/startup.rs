//! The container startup plan.
//!
//! A [`StartupPlan`] lists the commands a container needs; [`StartupPlan::steps`]
//! turns it into the fixed sequence the sequencer executes:
//!
//! ```text
//! wait for dependencies -> migrate -> collect static (best effort)
//!     -> launch worker (background) -> launch scheduler (background)
//!     -> launch server (foreground, last)
//! ```
//!
//! The order is not configurable. The container role prunes steps but
//! never reorders them.

use serde::Serialize;

use crate::command::CommandSpec;
use crate::error::CoreError;
use crate::readiness::Endpoint;
use crate::role::Role;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    WaitForDependencies,
    Migrate,
    CollectStatic,
    LaunchWorker,
    LaunchScheduler,
    LaunchServer,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitForDependencies => "wait_for_dependencies",
            Self::Migrate => "migrate",
            Self::CollectStatic => "collect_static",
            Self::LaunchWorker => "launch_worker",
            Self::LaunchScheduler => "launch_scheduler",
            Self::LaunchServer => "launch_server",
        }
    }
}

/// How a step's failure affects the rest of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// Failure aborts startup; the container exits non-zero.
    Fatal,
    /// Failure is recorded as a warning and startup continues.
    BestEffort,
}

/// How a step is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// Probe the dependencies.
    Gate,
    /// Run to completion before moving on.
    OneShot,
    /// Start under supervision and move on immediately.
    Background,
    /// Run in the foreground; its exit code is the container's.
    Foreground,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// The step had nothing to do (disabled command, no dependencies).
    Skipped,
    /// A best-effort step failed; startup continued.
    Degraded { reason: String },
    Failed { reason: String },
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// The result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub kind: StepKind,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

impl StepReport {
    pub fn new(kind: StepKind, outcome: StepOutcome, duration_ms: u64) -> Self {
        Self {
            kind,
            outcome,
            duration_ms,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.outcome, StepOutcome::Degraded { .. })
    }
}

/// One entry of the executable sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub policy: StepPolicy,
    pub mode: StepMode,
    /// `None` for the readiness gate and for disabled one-shot steps.
    pub command: Option<CommandSpec>,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StartupPlan {
    pub role: Role,
    pub dependencies: Vec<Endpoint>,
    pub migrate: Option<CommandSpec>,
    pub collect_static: Option<CommandSpec>,
    pub worker: Option<CommandSpec>,
    pub scheduler: Option<CommandSpec>,
    pub server: Option<CommandSpec>,
}

impl StartupPlan {
    /// The kind of step that ends in the foreground for this role.
    pub fn foreground_kind(&self) -> StepKind {
        match self.role {
            Role::All | Role::Web => StepKind::LaunchServer,
            Role::Worker => StepKind::LaunchWorker,
            Role::Scheduler => StepKind::LaunchScheduler,
        }
    }

    /// The command that becomes the container's main process.
    pub fn foreground(&self) -> Option<&CommandSpec> {
        match self.foreground_kind() {
            StepKind::LaunchWorker => self.worker.as_ref(),
            StepKind::LaunchScheduler => self.scheduler.as_ref(),
            _ => self.server.as_ref(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.foreground().is_none() {
            return Err(CoreError::Validation(format!(
                "role '{}' needs a command for its foreground step '{}'",
                self.role.as_str(),
                self.foreground_kind().as_str()
            )));
        }
        Ok(())
    }

    /// The ordered steps for this plan's role.
    ///
    /// The foreground step is always last. Background launches with no
    /// configured command are left out entirely.
    pub fn steps(&self) -> Vec<PlannedStep> {
        let mut steps = vec![PlannedStep {
            kind: StepKind::WaitForDependencies,
            policy: StepPolicy::Fatal,
            mode: StepMode::Gate,
            command: None,
        }];

        if self.role.prepares_application() {
            steps.push(PlannedStep {
                kind: StepKind::Migrate,
                policy: StepPolicy::Fatal,
                mode: StepMode::OneShot,
                command: self.migrate.clone(),
            });
            steps.push(PlannedStep {
                kind: StepKind::CollectStatic,
                policy: StepPolicy::BestEffort,
                mode: StepMode::OneShot,
                command: self.collect_static.clone(),
            });
        }

        if self.role.runs_background_services() {
            for (kind, command) in [
                (StepKind::LaunchWorker, &self.worker),
                (StepKind::LaunchScheduler, &self.scheduler),
            ] {
                if let Some(command) = command {
                    steps.push(PlannedStep {
                        kind,
                        policy: StepPolicy::BestEffort,
                        mode: StepMode::Background,
                        command: Some(command.clone()),
                    });
                }
            }
        }

        steps.push(PlannedStep {
            kind: self.foreground_kind(),
            policy: StepPolicy::Fatal,
            mode: StepMode::Foreground,
            command: self.foreground().cloned(),
        });

        steps
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> Option<CommandSpec> {
        Some(CommandSpec::parse(line).expect("parse"))
    }

    fn full_plan(role: Role) -> StartupPlan {
        StartupPlan {
            role,
            dependencies: vec![Endpoint::new("db", 5432)],
            migrate: cmd("python manage.py migrate"),
            collect_static: cmd("python manage.py collectstatic --noinput"),
            worker: cmd("celery -A project worker"),
            scheduler: cmd("celery -A project beat"),
            server: cmd("gunicorn project.wsgi:application"),
        }
    }

    fn kinds(plan: &StartupPlan) -> Vec<StepKind> {
        plan.steps().iter().map(|s| s.kind).collect()
    }

    #[test]
    fn all_role_runs_the_full_sequence_in_order() {
        assert_eq!(
            kinds(&full_plan(Role::All)),
            vec![
                StepKind::WaitForDependencies,
                StepKind::Migrate,
                StepKind::CollectStatic,
                StepKind::LaunchWorker,
                StepKind::LaunchScheduler,
                StepKind::LaunchServer,
            ]
        );
    }

    #[test]
    fn policies_and_modes_follow_the_step() {
        let steps = full_plan(Role::All).steps();
        let by_kind = |k| steps.iter().find(|s| s.kind == k).expect("step");
        assert_eq!(by_kind(StepKind::Migrate).policy, StepPolicy::Fatal);
        assert_eq!(by_kind(StepKind::CollectStatic).policy, StepPolicy::BestEffort);
        assert_eq!(by_kind(StepKind::LaunchWorker).mode, StepMode::Background);
        assert_eq!(by_kind(StepKind::LaunchScheduler).mode, StepMode::Background);
        assert_eq!(by_kind(StepKind::LaunchServer).mode, StepMode::Foreground);
    }

    #[test]
    fn foreground_step_is_always_last() {
        for role in [Role::All, Role::Web, Role::Worker, Role::Scheduler] {
            let steps = full_plan(role).steps();
            let last = steps.last().expect("non-empty");
            assert_eq!(last.mode, StepMode::Foreground, "{role:?}");
            assert_eq!(
                steps.iter().filter(|s| s.mode == StepMode::Foreground).count(),
                1
            );
        }
    }

    #[test]
    fn web_role_skips_background_launches() {
        assert_eq!(
            kinds(&full_plan(Role::Web)),
            vec![
                StepKind::WaitForDependencies,
                StepKind::Migrate,
                StepKind::CollectStatic,
                StepKind::LaunchServer,
            ]
        );
    }

    #[test]
    fn worker_role_gates_then_runs_worker_in_foreground() {
        let plan = full_plan(Role::Worker);
        assert_eq!(
            kinds(&plan),
            vec![StepKind::WaitForDependencies, StepKind::LaunchWorker]
        );
        assert_eq!(plan.foreground().expect("fg").args, vec!["-A", "project", "worker"]);
    }

    #[test]
    fn missing_background_command_is_left_out() {
        let plan = StartupPlan {
            scheduler: None,
            ..full_plan(Role::All)
        };
        assert!(!kinds(&plan).contains(&StepKind::LaunchScheduler));
    }

    #[test]
    fn disabled_one_shot_step_stays_in_order_without_command() {
        let plan = StartupPlan {
            migrate: None,
            ..full_plan(Role::All)
        };
        let steps = plan.steps();
        assert_eq!(steps[1].kind, StepKind::Migrate);
        assert!(steps[1].command.is_none());
    }

    #[test]
    fn validate_requires_a_foreground_command() {
        let plan = StartupPlan {
            worker: None,
            ..full_plan(Role::Worker)
        };
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("launch_worker"));
        assert!(full_plan(Role::Worker).validate().is_ok());
    }

    #[test]
    fn report_serializes_with_flattened_outcome() {
        let report = StepReport::new(
            StepKind::CollectStatic,
            StepOutcome::Degraded {
                reason: "exit code 1".into(),
            },
            12,
        );
        assert!(report.is_warning());
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["kind"], "collect_static");
        assert_eq!(json["outcome"], "degraded");
        assert_eq!(json["reason"], "exit code 1");
        assert_eq!(json["duration_ms"], 12);
    }

    #[test]
    fn only_failed_outcomes_count_as_failures() {
        let degraded = StepOutcome::Degraded {
            reason: "exit code 1".into(),
        };
        assert!(!degraded.is_failure());
        assert!(!StepOutcome::Succeeded.is_failure());
        assert!(!StepOutcome::Skipped.is_failure());
        assert!(StepOutcome::Failed {
            reason: "exit code 3".into()
        }
        .is_failure());
    }
}
