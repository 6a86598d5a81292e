//! Plain HTTP handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: &'static str,
    /// Live registrations on the snapshot hub.
    pub snapshot_subscribers: usize,
    /// Live registrations on the ping hub.
    pub ping_subscribers: usize,
}

/// Report liveness and the number of connected observers.
///
/// # Route
///
/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        snapshot_subscribers: state.snapshots.subscriber_count(),
        ping_subscribers: state.pings.subscriber_count(),
    })
}
