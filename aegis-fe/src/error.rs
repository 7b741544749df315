//! Error types for aegis-fe
//!
//! AI failures never reach this layer: the race resolves them to the
//! fallback result, and reconciliation only logs them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{IngestError, InputError, ReconcileError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Feedback rejected by normalization (400)
    #[error("Invalid feedback: {0}")]
    InvalidInput(#[from] InputError),

    /// Conflict (409), e.g. resolving an already resolved record
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Storage failure (500)
    #[error("Storage error: {0}")]
    Common(#[from] aegis_common::Error),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Input(e) => ApiError::InvalidInput(e),
            IngestError::Store(e) => ApiError::Internal(format!("Storage error: {}", e)),
            IngestError::Task(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ApiError {
    /// True for failures worth recording as the service's last error
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Internal(_) | ApiError::Common(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::InvalidInput(ref err) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", err.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
