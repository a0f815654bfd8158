//! API error types for the wall service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sticky_common::time_remaining::format_time_remaining;
use thiserror::Error;

/// API error type.
///
/// Every rejection carries a plain-language message; the rate-limit
/// rejection additionally carries the numeric and human-readable wait.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Identity already posted within the window (429)
    #[error("rate limited")]
    RateLimited { remaining_ms: i64 },

    /// Malformed/missing/oversized payload or invalid parameter (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Placement violates the overlap policy (409)
    #[error("placement overlaps an existing note")]
    Overlap { fraction: f64 },

    /// Image persistence failed (500; safe to retry the submission)
    #[error("image upload failed: {0}")]
    Upload(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Admin credential missing or invalid (401)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Duplicate resource (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<sticky_common::Error> for ApiError {
    fn from(err: sticky_common::Error) -> Self {
        use sticky_common::Error;
        match err {
            Error::RateLimited { remaining_ms } => ApiError::RateLimited { remaining_ms },
            Error::InvalidInput(msg) => ApiError::Validation(msg),
            Error::Overlap { fraction } => ApiError::Overlap { fraction },
            Error::Upload(msg) => ApiError::Upload(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Database(e) => ApiError::Internal(format!("database error: {}", e)),
            Error::Io(e) => ApiError::Internal(format!("io error: {}", e)),
            Error::Config(msg) => ApiError::Internal(format!("configuration error: {}", msg)),
            Error::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::RateLimited { remaining_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": {
                        "code": "RATE_LIMITED",
                        "message": format!(
                            "You already posted a note; try again in {}",
                            format_time_remaining(remaining_ms)
                        ),
                        "retry_after_ms": remaining_ms,
                        "wait": format_time_remaining(remaining_ms),
                    }
                }),
            ),
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                error_body("VALIDATION_ERROR", &msg),
            ),
            ApiError::Overlap { fraction } => (
                StatusCode::CONFLICT,
                json!({
                    "error": {
                        "code": "OVERLAP",
                        "message": "That spot overlaps an existing note too much; pick another.",
                        "overlap_fraction": fraction,
                    }
                }),
            ),
            ApiError::Upload(msg) => {
                tracing::error!(error = %msg, "image upload failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("UPLOAD_FAILED", "Could not store the image; please try again."),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body("NOT_FOUND", &msg)),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, error_body("UNAUTHORIZED", &msg))
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, error_body("CONFLICT", &msg)),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("INTERNAL_ERROR", "Something went wrong handling the request."),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn error_body(code: &str, message: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
