//! Domain error types for the verification job server.
//!
//! Uses thiserror for ergonomic error handling with automatic Display
//! implementations. Only submission validation surfaces synchronously to API
//! callers; pipeline failures travel through job state instead.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Application-level errors surfaced at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad submission config, rejected before a job record is queued
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Request conflicts with current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Workspace or log filesystem operation failed
    #[error("Filesystem error: {0}")]
    FileSystem(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_code, response_message) = match self {
            AppError::Validation(_) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                self.to_string(),
            ),
            AppError::NotFound(_) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
            ),
            AppError::Conflict(_) => (
                actix_web::http::StatusCode::CONFLICT,
                "CONFLICT",
                self.to_string(),
            ),
            AppError::FileSystem(err_str) => {
                tracing::error!("Filesystem error: {}", err_str);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "FILESYSTEM_ERROR",
                    "An internal filesystem error occurred".to_string(),
                )
            }
            AppError::Internal(err_str) => {
                tracing::error!("Internal error: {}", err_str);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        HttpResponse::build(status).json(ErrorResponse {
            success: false,
            error: ErrorBody {
                code: error_code.to_string(),
                message: response_message,
            },
        })
    }
}

/// Error detail carried inside the response envelope.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Error response body: `{success: false, error: {code, message}}`.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error.code, self.error.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileSystem(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Validation(format!("Invalid UUID: {}", err))
    }
}
