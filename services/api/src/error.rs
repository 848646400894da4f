//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sugoroku_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required request field is missing or the body is not valid JSON.
    #[error("{0}")]
    Validation(String),

    /// A credential or URL the endpoint needs was not configured.
    #[error("{0}")]
    Configuration(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Port(PortError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Port(_) => StatusCode::BAD_REQUEST,
            ApiError::Config(_)
            | ApiError::Configuration(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_error_taxonomy() {
        assert_eq!(
            ApiError::Validation("missing".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Configuration("no key".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(PortError::Unexpected("boom".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PortError::Timeout("slow".into())).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = ApiError::Validation("Missing query or user_id".into());
        assert_eq!(err.to_string(), "Missing query or user_id");
    }
}
