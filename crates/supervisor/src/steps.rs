//! One-shot startup steps (schema migration, static asset collection).
//!
//! [`run_step`] executes the command and applies the step's
//! [`StepPolicy`]: a fatal step turns failure into an error, a best-effort
//! step turns it into a `Degraded` report and a warning.

use std::time::{Duration, Instant};

use alibi_core::command::CommandSpec;
use alibi_core::startup::{StepKind, StepOutcome, StepPolicy, StepReport};

use crate::error::SupervisorError;
use crate::process;

/// Run a one-shot step.
///
/// `command == None` means the step is disabled and yields `Skipped`.
pub async fn run_step(
    kind: StepKind,
    command: Option<&CommandSpec>,
    policy: StepPolicy,
    timeout: Option<Duration>,
) -> Result<StepReport, SupervisorError> {
    let Some(command) = command else {
        tracing::info!(step = kind.as_str(), "Step disabled, skipping");
        return Ok(StepReport::new(kind, StepOutcome::Skipped, 0));
    };

    tracing::info!(step = kind.as_str(), command = %command, "Running step");
    let start = Instant::now();

    let failure = match process::run_to_completion(command, timeout).await {
        Ok(Some(outcome)) if outcome.success() => {
            tracing::info!(
                step = kind.as_str(),
                elapsed_ms = outcome.duration_ms,
                "Step completed",
            );
            return Ok(StepReport::new(kind, StepOutcome::Succeeded, outcome.duration_ms));
        }
        Ok(Some(outcome)) => SupervisorError::StepFailed {
            step: kind,
            exit_code: outcome.exit_code,
        },
        Ok(None) => SupervisorError::StepTimeout {
            step: kind,
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => e,
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match policy {
        StepPolicy::Fatal => {
            tracing::error!(step = kind.as_str(), elapsed_ms, error = %failure, "Step failed, aborting startup");
            Err(failure)
        }
        StepPolicy::BestEffort => {
            tracing::warn!(step = kind.as_str(), elapsed_ms, error = %failure, "Step failed, continuing");
            Ok(StepReport::new(
                kind,
                StepOutcome::Degraded {
                    reason: failure.to_string(),
                },
                elapsed_ms,
            ))
        }
    }
}
