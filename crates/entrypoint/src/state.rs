use std::sync::Arc;
use std::time::Duration;

use alibi_core::readiness::Endpoint;
use alibi_core::role::Role;
use alibi_supervisor::{StartupSnapshot, Supervisor};
use tokio::sync::watch;

/// Shared state for the status endpoint handlers.
///
/// Cheap to clone: everything is behind `Arc` or a watch receiver.
#[derive(Clone)]
pub struct StatusState {
    pub role: Role,
    /// Startup progress published by the sequencer.
    pub progress: watch::Receiver<StartupSnapshot>,
    /// Background services launched during startup.
    pub supervisor: Arc<Supervisor>,
    /// Dependencies re-probed on every health request.
    pub dependencies: Arc<Vec<Endpoint>>,
    pub probe_timeout: Duration,
}
