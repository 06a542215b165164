use alibi_core::readiness::Endpoint;
use alibi_core::startup::StepKind;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Dependency {endpoint} not reachable after {elapsed_ms}ms ({attempts} attempts)")]
    DependencyTimeout {
        endpoint: Endpoint,
        elapsed_ms: u64,
        attempts: u32,
    },

    #[error("Startup cancelled")]
    Cancelled,

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Step '{}' failed with exit code {exit_code}", .step.as_str())]
    StepFailed { step: StepKind, exit_code: i32 },

    #[error("Step '{}' timed out after {elapsed_ms}ms", .step.as_str())]
    StepTimeout { step: StepKind, elapsed_ms: u64 },

    #[error("Service '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    #[error("Invalid startup plan: {0}")]
    InvalidPlan(#[from] alibi_core::error::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Exit code the entrypoint should report for this error.
    ///
    /// A failed step propagates its own non-zero code; everything else
    /// maps to `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StepFailed { exit_code, .. } if *exit_code != 0 => *exit_code,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_dependency_timeout() {
        let err = SupervisorError::DependencyTimeout {
            endpoint: Endpoint::new("db", 5432),
            elapsed_ms: 3000,
            attempts: 4,
        };
        assert_eq!(
            err.to_string(),
            "Dependency db:5432 not reachable after 3000ms (4 attempts)"
        );
    }

    #[test]
    fn display_step_failed() {
        let err = SupervisorError::StepFailed {
            step: StepKind::Migrate,
            exit_code: 2,
        };
        assert_eq!(err.to_string(), "Step 'migrate' failed with exit code 2");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn non_step_errors_exit_with_one() {
        assert_eq!(SupervisorError::Cancelled.exit_code(), 1);
        let spawn = SupervisorError::Spawn {
            program: "missing".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(spawn.exit_code(), 1);
        assert!(std::error::Error::source(&spawn).is_some());
    }
}
