//! Error handling for the Flowline Server API
//!
//! Every failure is rendered as
//! `{"error": ..., "errorDetails": {"errorCode": ..., "errorMessage": ...}}`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use flowline_core::CoreError;
use serde_json::json;
use tracing::error;

use crate::error::ServerError;

/// API Error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Not found (404)
    NotFound(String),
    /// Wrapped server error
    ServerError(ServerError),
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError::ServerError(err)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::ServerError(ServerError::Core(err))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::ServerError(err) => write!(f, "Server Error: {}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(msg) => {
                error_body(StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", &msg)
            }
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, "ERR_NOT_FOUND", &msg),
            ApiError::ServerError(err) => api_error_response(&err),
        }
    }
}

/// HTTP status for a core error code
fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::FlowNotFound { .. }
        | CoreError::FlowVersionNotFound { .. }
        | CoreError::FlowRunNotFound { .. }
        | CoreError::ProjectNotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::LockTimeout { .. }
        | CoreError::VersionLocked { .. }
        | CoreError::RunAlreadyFinished { .. } => StatusCode::CONFLICT,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::StateStore(_) | CoreError::Serialization(_) | CoreError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Convert a server error into a standardized API error response
pub fn api_error_response(err: &ServerError) -> axum::response::Response {
    let (status_code, error_code, error_message) = match err {
        ServerError::Core(core) => (
            core_status(core),
            format!("ERR_{}", core.code()),
            core.to_string(),
        ),
        ServerError::ConfigError(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_CONFIG_ERROR".to_string(),
            msg.clone(),
        ),
        ServerError::IoError(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_INTERNAL_SERVER_ERROR".to_string(),
            e.to_string(),
        ),
    };

    if status_code.is_server_error() {
        error!(error = %err, error_code = %error_code, "Request failed");
    }

    error_body(status_code, &error_code, &error_message)
}

fn error_body(status: StatusCode, error_code: &str, message: &str) -> axum::response::Response {
    let body = Json(json!({
        "error": message,
        "errorDetails": {
            "errorCode": error_code,
            "errorMessage": message,
        }
    }));

    (status, body).into_response()
}
