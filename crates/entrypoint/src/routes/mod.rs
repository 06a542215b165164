pub mod health;

use axum::Router;

use crate::state::StatusState;

/// All routes served by the status endpoint.
pub fn router() -> Router<StatusState> {
    Router::new().merge(health::router())
}
