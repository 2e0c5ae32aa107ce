use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::workflow::WorkflowError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Model failures never get here: they are reported inside the workspace.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::SubjectNotFound(_) => AppError::NotFound(e.to_string()),
            WorkflowError::InvalidGrade(_)
            | WorkflowError::NotEnoughSubjects
            | WorkflowError::EmptyMessage => AppError::Validation(e.to_string()),
            WorkflowError::WrongPhase { .. } | WorkflowError::ReplyInFlight => {
                AppError::Conflict(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::Conflict(msg) => {
                tracing::debug!("Rejected request in current phase: {msg}");
                (StatusCode::CONFLICT, "CONFLICT", msg)
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
