//! Health check endpoint for the Flowline Server

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::AppState;

/// Health check handler
///
/// Reports `UP` when the state store answers a read, `DOWN` with a 503
/// otherwise.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");

    let state_store_status = if state.state_store_healthy().await {
        "UP"
    } else {
        "DOWN"
    };

    let status = if state_store_status == "UP" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": state_store_status,
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": {
                "stateStore": { "status": state_store_status },
            },
        })),
    )
}
