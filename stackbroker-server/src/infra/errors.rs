use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use stackbroker_core::BrokerError;

pub type AppResult<T> = Result<T, AppError>;

/// Error returned by the broker API, rendered as the service broker error
/// body `{"error": ..., "description": ...}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: String,
    pub description: String,
}

impl AppError {
    pub fn new(status: StatusCode, description: impl Into<String>) -> Self {
        Self {
            status,
            error: default_code(status),
            description: description.into(),
        }
    }

    pub fn with_code(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, description)
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, description)
    }

    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, description)
    }

    pub fn precondition_failed(description: impl Into<String>) -> Self {
        Self::new(StatusCode::PRECONDITION_FAILED, description)
    }
}

fn default_code(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Error")
        .replace(' ', "")
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.description)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "description": self.description,
        }));

        (self.status, body).into_response()
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %err, "broker operation failed");
        }
        let error = Self::new(status, err.to_string());
        match err.error_code() {
            Some(code) => error.with_code(code),
            None => error,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}
