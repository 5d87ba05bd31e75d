use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Duplicate likes and duplicate matches are not errors: the ledger reports
/// them as boolean outcomes. An incomplete questionnaire is not an error either:
/// rankings come back empty and recalculation is a no-op.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing questionnaire definition. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown user id or (seeker, provider) pair.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Two profiles built by different aggregation strategies were compared.
    #[error("Strategy mismatch: {0}")]
    StrategyMismatch(String),

    /// The conversation state machine rejected an event.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Session(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "The service is misconfigured".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::StrategyMismatch(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "STRATEGY_MISMATCH",
                msg.clone(),
            ),
            AppError::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", msg.clone())
            }
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred, please try again".to_string(),
                )
            }
            AppError::Session(msg) => {
                tracing::error!("Session store error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SESSION_ERROR",
                    "A session storage error occurred, please try again".to_string(),
                )
            }
            AppError::Notify(msg) => {
                tracing::error!("Notification error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "NOTIFY_ERROR",
                    "A notification delivery error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred, please try again".to_string(),
                )
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
