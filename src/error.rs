use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No active test window")]
    NoActiveWindow,

    #[error("Answers have already been submitted for this window")]
    AlreadySubmitted,

    #[error("Answers are missing for questions {0:?}")]
    IncompleteAnswers(Vec<u32>),

    #[error("Answer text could not be parsed")]
    InvalidAnswerFormat,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, code, error_message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Error::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Error::NoActiveWindow => (
                StatusCode::NOT_FOUND,
                "no_active_test",
                "No active test window".to_string(),
            ),
            Error::AlreadySubmitted => (
                StatusCode::CONFLICT,
                "already_submitted",
                "Answers have already been submitted".to_string(),
            ),
            Error::IncompleteAnswers(missing) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "incomplete_answers",
                format!("Missing answers for questions: {:?}", missing),
            ),
            Error::InvalidAnswerFormat => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_answer_format",
                "Answer format is invalid. Example: 1A2B3C".to_string(),
            ),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "bad_json", err.to_string()),
            Error::Reqwest(err) => (
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("External service error: {}", err),
            ),
            Error::Telegram(msg) => (StatusCode::BAD_GATEWAY, "telegram_error", msg),
            Error::Database(err) => {
                tracing::error!(error = ?err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An unexpected error occurred".to_string(),
                )
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An unexpected error occurred".to_string(),
            ),
        };

        let body = Json(json!({ "error": code, "message": error_message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
