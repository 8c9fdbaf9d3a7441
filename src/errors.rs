use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),
    #[error("generation timed out")]
    GenerationTimeout,
    #[error("empty message")]
    EmptyMessage,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl BotError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        BotError::Internal(err.to_string())
    }
}

impl IntoResponse for BotError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            BotError::InvalidConfig(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            BotError::UnsupportedFormat(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone()),
            BotError::EmbeddingUnavailable(msg)
            | BotError::IndexUnavailable(msg)
            | BotError::GenerationUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            BotError::GenerationTimeout => {
                (StatusCode::GATEWAY_TIMEOUT, "generation timed out".to_string())
            }
            BotError::EmptyMessage => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "message body must not be empty".to_string(),
            ),
            BotError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            BotError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            BotError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
