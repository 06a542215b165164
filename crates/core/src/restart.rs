//! Restart policy for supervised background services.
//!
//! After a service process exits, [`RestartPolicy::decide`] says whether
//! to start it again and how long to wait first. Delays grow
//! exponentially from `initial_backoff` up to `max_backoff`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const MODE_NEVER: &str = "never";
pub const MODE_ON_FAILURE: &str = "on-failure";
pub const MODE_ALWAYS: &str = "always";

pub const VALID_RESTART_MODES: &[&str] = &[MODE_NEVER, MODE_ON_FAILURE, MODE_ALWAYS];

/// Default cap on consecutive restarts before giving up.
pub const DEFAULT_MAX_RESTARTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
    Never,
    #[default]
    OnFailure,
    Always,
}

impl RestartMode {
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            MODE_NEVER => Ok(Self::Never),
            MODE_ON_FAILURE => Ok(Self::OnFailure),
            MODE_ALWAYS => Ok(Self::Always),
            other => Err(CoreError::Validation(format!(
                "Invalid restart policy '{other}'. Must be one of: {}",
                VALID_RESTART_MODES.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => MODE_NEVER,
            Self::OnFailure => MODE_ON_FAILURE,
            Self::Always => MODE_ALWAYS,
        }
    }
}

/// What to do after a service exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart { delay: Duration },
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    pub mode: RestartMode,
    /// Consecutive restarts allowed. `None` means unlimited.
    pub max_restarts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// A run lasting at least this long resets the restart counter.
    pub reset_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            mode: RestartMode::OnFailure,
            max_restarts: Some(DEFAULT_MAX_RESTARTS),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            reset_after: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    pub fn never() -> Self {
        Self {
            mode: RestartMode::Never,
            ..Default::default()
        }
    }

    /// Decide whether to restart after an exit.
    ///
    /// `restarts_so_far` counts consecutive restarts already performed.
    /// The delay doubles with each consecutive restart.
    pub fn decide(&self, exited_successfully: bool, restarts_so_far: u32) -> RestartDecision {
        let wants_restart = match self.mode {
            RestartMode::Never => false,
            RestartMode::OnFailure => !exited_successfully,
            RestartMode::Always => true,
        };
        if !wants_restart {
            return RestartDecision::GiveUp;
        }
        if self.max_restarts.is_some_and(|max| restarts_so_far >= max) {
            return RestartDecision::GiveUp;
        }
        RestartDecision::Restart {
            delay: self.backoff_for(restarts_so_far),
        }
    }

    /// Backoff before restart number `restarts_so_far + 1`.
    pub fn backoff_for(&self, restarts_so_far: u32) -> Duration {
        let factor = 2u32.saturating_pow(restarts_so_far.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Whether a run of `uptime` counts as stable.
    pub fn resets_counter(&self, uptime: Duration) -> bool {
        uptime >= self.reset_after
    }
}
