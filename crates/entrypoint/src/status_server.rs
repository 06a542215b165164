//! Optional HTTP status endpoint (`STATUS_ADDR`).

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderName, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::routes;
use crate::state::StatusState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The status router with its middleware stack.
pub fn build_app(state: StatusState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    routes::router()
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}

/// Serve the status endpoint until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    state: StatusState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Status endpoint listening");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
