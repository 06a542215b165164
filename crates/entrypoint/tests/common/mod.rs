use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::watch;
use tower::ServiceExt;

use alibi_core::readiness::Endpoint;
use alibi_core::role::Role;
use alibi_core::startup::StepReport;
use alibi_entrypoint::state::StatusState;
use alibi_entrypoint::status_server::build_app;
use alibi_supervisor::{StartupPhase, StartupSnapshot, Supervisor};

/// Build the status router around a fixed startup snapshot.
///
/// Returns the supervisor too so tests can launch services into it.
pub fn build_test_app(
    phase: StartupPhase,
    steps: Vec<StepReport>,
    dependencies: Vec<Endpoint>,
) -> (Router, Arc<Supervisor>) {
    // The receiver keeps the last value after the sender is gone.
    let (_, rx) = watch::channel(StartupSnapshot { phase, steps });

    let supervisor = Arc::new(Supervisor::new());
    let state = StatusState {
        role: Role::All,
        progress: rx,
        supervisor: Arc::clone(&supervisor),
        dependencies: Arc::new(dependencies),
        probe_timeout: Duration::from_millis(500),
    };
    (build_app(state), supervisor)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    app.oneshot(request).await.expect("response")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
