use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api_client::ApiError;
use crate::poller::PollError;
use crate::storage::StorageError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Polling exhausted: {0}")]
    TimeoutExhausted(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Text shown to the user in a notification or error body.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "Please sign in to continue".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Transport(_) => {
                "Could not reach the optimization service. Check your connection and try again."
                    .to_string()
            }
            AppError::Server(_) => {
                "The optimization service returned an unexpected response. Please try again."
                    .to_string()
            }
            AppError::NotFound(msg) => msg.clone(),
            AppError::TimeoutExhausted(_) => {
                "Optimization is taking longer than expected. Please check back in a few minutes."
                    .to_string()
            }
            AppError::Storage(_) => "The document could not be loaded from storage".to_string(),
            AppError::JobFailed(msg) => format!("Optimization failed: {msg}"),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Unavailable(_) => {
                "The optimization service is currently unavailable".to_string()
            }
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Transport(_) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
            AppError::Server(_) => (StatusCode::BAD_GATEWAY, "SERVER_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::TimeoutExhausted(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT_EXHAUSTED"),
            AppError::Storage(_) => (StatusCode::BAD_GATEWAY, "STORAGE_ERROR"),
            AppError::JobFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "JOB_FAILED"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transport(e) => AppError::Transport(e.to_string()),
            ApiError::Timeout { after } => {
                AppError::Transport(format!("request timed out after {}s", after.as_secs()))
            }
            ApiError::Server { status, message } => {
                AppError::Server(format!("status {status}: {message}"))
            }
            ApiError::Malformed(msg) => AppError::Server(format!("malformed response: {msg}")),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(format!("Document {path} not found")),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<PollError> for AppError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::NotFound => AppError::NotFound("No optimization job was given".to_string()),
            PollError::Unauthenticated => AppError::Unauthenticated,
            PollError::QueryError(msg) => AppError::Server(msg),
            PollError::JobFailed(msg) => AppError::JobFailed(msg),
            PollError::Timeout { attempts } => {
                AppError::TimeoutExhausted(format!("no terminal status after {attempts} attempts"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.code();

        match &self {
            AppError::Database(e) => tracing::error!("Database error: {e}"),
            AppError::Internal(e) => tracing::error!("Internal error: {e:?}"),
            AppError::Transport(msg) | AppError::Server(msg) | AppError::Storage(msg) => {
                tracing::error!("{code}: {msg}")
            }
            _ => {}
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.user_message()
            }
        }));

        (status, body).into_response()
    }
}
