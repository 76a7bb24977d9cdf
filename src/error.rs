//! Error types for Dashfeed
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse`. Responses are deliberately terse:
//! a status code and an empty body, never a structured error payload.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Session cookie missing, malformed, or signed with another secret
    #[error("Session cookie verification failed")]
    VerificationFailed,

    /// Session backend unreachable or returned garbage (500)
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// OAuth provider call failed (502)
    #[error("OAuth provider error: {0}")]
    Provider(String),

    /// Dashboard API call failed (502)
    #[error("External API error: {0}")]
    ExternalApi(String),

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable label used for metrics and logs
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::VerificationFailed => "verification_failed",
            AppError::SessionStore(_) => "session_store",
            AppError::Provider(_) => "provider",
            AppError::ExternalApi(_) => "external_api",
            AppError::Validation(_) => "validation",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::VerificationFailed => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Provider(_) | AppError::ExternalApi(_) => StatusCode::BAD_GATEWAY,
            AppError::SessionStore(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::SessionStore(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each variant to a status code; the body is always empty.
    fn into_response(self) -> Response {
        use crate::metrics::ERRORS_TOTAL;

        let error_type = self.error_type();
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        match self.status_code() {
            status if status.is_server_error() => {
                tracing::error!(error = %self, error_type, "Request aborted");
            }
            _ => {
                tracing::debug!(error = %self, error_type, "Request rejected");
            }
        }

        self.status_code().into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
