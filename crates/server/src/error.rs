// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use taskforge_core::{ErrorClass, TaskId, TaskKind, ValidationError};
use taskforge_db::DbError;
use thiserror::Error;

/// Errors raised by the controller and executor.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Invalid task request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Task {id} is not owned by {owner}")]
    Forbidden { id: TaskId, owner: String },

    #[error("Task {0} is still active")]
    NotTerminal(TaskId),

    #[error("Could not resolve a task for {subject}/{kind} after {attempts} attempts")]
    Contention {
        subject: String,
        kind: TaskKind,
        attempts: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl TaskError {
    /// Taxonomy bucket for the `error_class` log field.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Contention { .. } | Self::NotTerminal(_) => ErrorClass::Coordination,
            Self::Database(_) => ErrorClass::Transient,
            _ => ErrorClass::Terminal,
        }
    }
}

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        tracing::debug!(error = %err, error_class = %err.class(), "Task request rejected");
        match err {
            TaskError::NotFound(id) => Self::TaskNotFound(id),
            TaskError::Validation(e) => Self::BadRequest(e.to_string()),
            e @ TaskError::Forbidden { .. } => Self::Forbidden(e.to_string()),
            e @ (TaskError::NotTerminal(_) | TaskError::Contention { .. }) => {
                Self::Conflict(e.to_string())
            }
            TaskError::Database(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::TaskNotFound(id) => {
                tracing::debug!(task_id = %id, "Task not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Task not found", format!("Task ID: {}", id)),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Forbidden(msg) => {
                tracing::warn!(message = %msg, "Forbidden");
                (
                    StatusCode::FORBIDDEN,
                    ErrorResponse::with_details("Forbidden", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, error_class = %ErrorClass::Coordination, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Database error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
