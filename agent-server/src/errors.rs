use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Uniform error-to-response bridge for the Control API (spec §6, §9
/// "Control-API bad input → 4xx structured error, snapshot unchanged").
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<agent_config::ConfigError> for AppError {
    fn from(err: agent_config::ConfigError) -> Self {
        use agent_config::ConfigError;
        match err {
            ConfigError::InvalidOverride { .. } | ConfigError::UnknownPath(_) | ConfigError::TooManyTailers { .. } => Self::bad_request(err.to_string()),
            ConfigError::BackendUnreachable(_) | ConfigError::CacheRead(_) | ConfigError::CacheWrite(_) => Self::service_unavailable(err.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<agent_core::telemetry::SpoolError> for AppError {
    fn from(err: agent_core::telemetry::SpoolError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
