//! Error type for HTTP handlers.
//!
//! Bridges [`RegistrationError`] to HTTP responses with a JSON
//! `{code, message}` body.

use crate::error::RegistrationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Application error returned by handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<RegistrationError> for AppError {
    fn from(error: RegistrationError) -> Self {
        let status = match &error {
            RegistrationError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistrationError::DuplicateRegistration { .. }
            | RegistrationError::CapacityExceeded { .. } => StatusCode::CONFLICT,
            RegistrationError::Forbidden(_) => StatusCode::FORBIDDEN,
            RegistrationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistrationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistrationError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let message = match &error {
            // Backend details stay in the log
            RegistrationError::Storage(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(code = error.code(), error = %error, "Request failed");
        }
        Self::new(status, message, error.code())
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
