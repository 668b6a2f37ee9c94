use axum::http::StatusCode;
use axum::Json;
use log::error;
use serde::{Deserialize, Serialize};

use crate::error::FocusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearedResponse {
    pub deleted: usize,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Maps domain errors onto HTTP responses. Internal failures are logged here
/// and reported to the client with a generic message.
impl From<FocusError> for ApiError {
    fn from(err: FocusError) -> Self {
        match err {
            FocusError::Unauthenticated => {
                api_error(StatusCode::UNAUTHORIZED, "Invalid or missing bearer token")
            }
            FocusError::InvalidSession(reason) => {
                api_error(StatusCode::BAD_REQUEST, format!("Invalid session: {reason}"))
            }
            FocusError::NotFound => api_error(StatusCode::NOT_FOUND, "No sessions found"),
            other => {
                error!("Request failed: {other:#}");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
