use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use alibi_core::startup::StepReport;
use alibi_supervisor::probe;
use alibi_supervisor::registry::ServiceSnapshot;
use alibi_supervisor::StartupPhase;

use crate::state::StatusState;

/// Reachability of one dependency at request time.
#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub endpoint: String,
    /// `"ok"` or `"fail"`.
    pub status: &'static str,
}

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `starting`, `ok` or `degraded`.
    pub status: &'static str,
    pub message: String,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub role: &'static str,
    pub steps: Vec<StepReport>,
    pub services: Vec<ServiceSnapshot>,
    pub dependencies: Vec<DependencyHealth>,
}

/// GET /health -- startup progress, background services and dependencies.
///
/// Always answers 200; callers read `status` from the body.
async fn health_check(State(state): State<StatusState>) -> Json<HealthResponse> {
    let snapshot = state.progress.borrow().clone();
    let services = state.supervisor.snapshot().await;

    let mut dependencies = Vec::with_capacity(state.dependencies.len());
    for endpoint in state.dependencies.iter() {
        let reachable = probe::probe(endpoint, state.probe_timeout).await.is_ok();
        dependencies.push(DependencyHealth {
            endpoint: endpoint.to_string(),
            status: if reachable { "ok" } else { "fail" },
        });
    }

    let services_alive = services.iter().all(|s| s.status.state.is_healthy());
    let dependencies_up = dependencies.iter().all(|d| d.status == "ok");
    let warnings = snapshot.steps.iter().filter(|r| r.is_warning()).count();

    let (status, message) = match &snapshot.phase {
        StartupPhase::Preparing => ("starting", "Startup sequence in progress".to_string()),
        StartupPhase::Aborted { reason } => ("degraded", format!("Startup aborted: {reason}")),
        StartupPhase::Finished { exit_code } => (
            "degraded",
            format!("Foreground process exited with code {exit_code}"),
        ),
        StartupPhase::Serving if !services_alive => {
            ("degraded", "A background service is not running".to_string())
        }
        StartupPhase::Serving if !dependencies_up => {
            ("degraded", "A dependency is unreachable".to_string())
        }
        StartupPhase::Serving if warnings > 0 => (
            "ok",
            format!("Application is running ({warnings} startup warning(s))"),
        ),
        StartupPhase::Serving => ("ok", "Application is running smoothly".to_string()),
    };

    Json(HealthResponse {
        status,
        message,
        version: env!("CARGO_PKG_VERSION"),
        role: state.role.as_str(),
        steps: snapshot.steps,
        services,
        dependencies,
    })
}

/// Mount health check routes.
pub fn router() -> Router<StatusState> {
    Router::new().route("/health", get(health_check))
}
