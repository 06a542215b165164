//! Container roles.
//!
//! The same image backs every service in the compose topology. The role
//! decides which part of the startup sequence a container runs and which
//! process ends up in the foreground.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ALL: &str = "all";
pub const ROLE_WEB: &str = "web";
pub const ROLE_WORKER: &str = "worker";
pub const ROLE_SCHEDULER: &str = "scheduler";

pub const VALID_ROLES: &[&str] = &[ROLE_ALL, ROLE_WEB, ROLE_WORKER, ROLE_SCHEDULER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Server in the foreground, worker and scheduler in the background.
    #[default]
    All,
    /// Server only; background processes run in their own containers.
    Web,
    /// Task worker in the foreground.
    Worker,
    /// Periodic scheduler in the foreground.
    Scheduler,
}

impl Role {
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            ROLE_ALL => Ok(Self::All),
            ROLE_WEB => Ok(Self::Web),
            ROLE_WORKER => Ok(Self::Worker),
            ROLE_SCHEDULER => Ok(Self::Scheduler),
            other => Err(CoreError::Validation(format!(
                "Invalid role '{other}'. Must be one of: {}",
                VALID_ROLES.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => ROLE_ALL,
            Self::Web => ROLE_WEB,
            Self::Worker => ROLE_WORKER,
            Self::Scheduler => ROLE_SCHEDULER,
        }
    }

    /// Whether this role owns schema migration and asset collection.
    pub fn prepares_application(&self) -> bool {
        matches!(self, Self::All | Self::Web)
    }

    /// Whether worker and scheduler run as background processes here.
    pub fn runs_background_services(&self) -> bool {
        matches!(self, Self::All)
    }
}
