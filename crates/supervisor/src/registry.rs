//! Named collection of supervised services.
//!
//! [`Supervisor`] is created once by the entrypoint and shared (via `Arc`)
//! with the sequencer and the status endpoint. All services hang off one
//! master [`CancellationToken`], so [`Supervisor::shutdown_all`] stops them
//! concurrently.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;
use crate::service::{ServiceHandle, ServiceSpec, ServiceStatus};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

pub struct Supervisor {
    services: RwLock<HashMap<String, ServiceHandle>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Start supervising `spec` without waiting for the process.
    ///
    /// A finished service with the same name is replaced; a live one is
    /// an error. Launching after [`Supervisor::shutdown_all`] is rejected.
    pub async fn launch(&self, spec: ServiceSpec) -> Result<(), SupervisorError> {
        if self.cancel.is_cancelled() {
            return Err(SupervisorError::Cancelled);
        }
        let mut services = self.services.write().await;
        if let Some(existing) = services.get(&spec.name) {
            if existing.is_alive() {
                return Err(SupervisorError::AlreadyRunning(spec.name));
            }
        }

        tracing::info!(service = %spec.name, command = %spec.command, "Launching background service");
        let name = spec.name.clone();
        let handle = ServiceHandle::start_with_parent(spec, &self.cancel);
        services.insert(name, handle);
        Ok(())
    }

    /// Status of every service, sorted by name.
    pub async fn snapshot(&self) -> Vec<ServiceSnapshot> {
        let services = self.services.read().await;
        let mut snapshot: Vec<_> = services
            .values()
            .map(|handle| ServiceSnapshot {
                name: handle.name().to_string(),
                status: handle.status(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }

    pub async fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.services.read().await.get(name).map(ServiceHandle::status)
    }

    /// Whether every launched service is alive (vacuously true when empty).
    pub async fn all_alive(&self) -> bool {
        self.services.read().await.values().all(ServiceHandle::is_alive)
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// Stop one service and remove it from the registry.
    pub async fn stop(&self, name: &str) -> Result<ServiceStatus, SupervisorError> {
        let handle = self
            .services
            .write()
            .await
            .remove(name)
            .ok_or_else(|| SupervisorError::ServiceNotFound(name.to_string()))?;
        Ok(handle.stop().await)
    }

    /// Stop every service and return their final states.
    pub async fn shutdown_all(&self) -> Vec<ServiceSnapshot> {
        self.cancel.cancel();

        let drained: Vec<ServiceHandle> = {
            let mut services = self.services.write().await;
            services.drain().map(|(_, handle)| handle).collect()
        };
        if drained.is_empty() {
            return Vec::new();
        }

        tracing::info!(count = drained.len(), "Stopping background services");
        let mut finals = Vec::with_capacity(drained.len());
        for handle in drained {
            let name = handle.name().to_string();
            let status = handle.stop().await;
            tracing::info!(
                service = %name,
                state = status.state.as_str(),
                exit_code = status.last_exit_code,
                restarts = status.restarts,
                "Background service shut down",
            );
            finals.push(ServiceSnapshot { name, status });
        }
        finals.sort_by(|a, b| a.name.cmp(&b.name));
        finals
    }
}
