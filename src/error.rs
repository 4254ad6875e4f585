use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error("Counter store error: {0}")]
    Store(String),

    #[error("Counter store returned unexpected reply {0}")]
    UnexpectedReply(i64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;

impl From<redis::RedisError> for GatekeeperError {
    fn from(err: redis::RedisError) -> Self {
        GatekeeperError::Store(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GatekeeperError {
    fn from(err: validator::ValidationErrors) -> Self {
        GatekeeperError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &GatekeeperError) -> Self {
        let message = err.to_string();
        match err {
            GatekeeperError::Store(_) | GatekeeperError::UnexpectedReply(_) => {
                Self::new("service_unavailable", &message, 503)
            }
            GatekeeperError::Configuration(_) => Self::new("configuration_error", &message, 500),
            GatekeeperError::Validation(_) => Self::new("validation_error", &message, 422),
            GatekeeperError::Io(_) | GatekeeperError::Json(_) | GatekeeperError::Internal(_) => {
                Self::new("internal_error", &message, 500)
            }
        }
    }
}

impl IntoResponse for GatekeeperError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
