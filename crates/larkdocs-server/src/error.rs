//! Error types for the server's non-protocol routes.
//!
//! `POST /mcp` never returns these: protocol failures travel as JSON-RPC
//! error objects. Everything else (OAuth routes, session close, startup)
//! uses [`ServerError`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use larkdocs_oauth::OAuthError;
use serde::Serialize;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upstream OAuth endpoint failed.
    #[error("Upstream error: {0}")]
    BadGateway(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<OAuthError> for ServerError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::InvalidRequest(msg) => ServerError::BadRequest(msg),
            OAuthError::Config(msg) => ServerError::Config(msg),
            OAuthError::AuthExpired(msg) => {
                ServerError::BadRequest(format!("authorization rejected: {}", msg))
            }
            OAuthError::Network(msg) | OAuthError::Serialization(msg) => {
                ServerError::BadGateway(msg)
            }
            OAuthError::NoCredential => ServerError::BadRequest(e.to_string()),
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Config(_) => (StatusCode::BAD_REQUEST, "config_error"),
        };

        let message = match &self {
            ServerError::Internal(detail) => {
                tracing::error!(status = %status, code, error = %detail, "Server error");
                "Internal error".to_string()
            }
            other => {
                let message = other.to_string();
                tracing::warn!(status = %status, code, error = %message, "Client error");
                message
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
