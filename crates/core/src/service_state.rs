//! Lifecycle states of a supervised background service.

use serde::{Deserialize, Serialize};

/// The process is being spawned.
pub const STATE_STARTING: &str = "starting";

/// The process is alive.
pub const STATE_RUNNING: &str = "running";

/// The process exited and a restart is scheduled.
pub const STATE_BACKING_OFF: &str = "backing_off";

/// The process exited cleanly and will not be restarted.
pub const STATE_EXITED: &str = "exited";

/// The process crashed and the restart policy gave up.
pub const STATE_FAILED: &str = "failed";

/// The supervisor stopped the process on request.
pub const STATE_STOPPED: &str = "stopped";

pub const VALID_SERVICE_STATES: &[&str] = &[
    STATE_STARTING,
    STATE_RUNNING,
    STATE_BACKING_OFF,
    STATE_EXITED,
    STATE_FAILED,
    STATE_STOPPED,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Running,
    BackingOff,
    Exited,
    Failed,
    Stopped,
}

impl ServiceState {
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            STATE_STARTING => Ok(Self::Starting),
            STATE_RUNNING => Ok(Self::Running),
            STATE_BACKING_OFF => Ok(Self::BackingOff),
            STATE_EXITED => Ok(Self::Exited),
            STATE_FAILED => Ok(Self::Failed),
            STATE_STOPPED => Ok(Self::Stopped),
            _ => Err(format!(
                "Invalid service state '{s}'. Must be one of: {}",
                VALID_SERVICE_STATES.join(", ")
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => STATE_STARTING,
            Self::Running => STATE_RUNNING,
            Self::BackingOff => STATE_BACKING_OFF,
            Self::Exited => STATE_EXITED,
            Self::Failed => STATE_FAILED,
            Self::Stopped => STATE_STOPPED,
        }
    }

    /// No further transitions will happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Failed | Self::Stopped)
    }

    /// The service is up or expected to come back on its own.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::BackingOff)
    }
}
