//! Error types for document resolution and retrieval.

use crate::types::FailureKind;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Errors raised before any upstream call is made.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    /// The URL does not yield a usable document identifier.
    #[error("invalid document URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Client construction failed.
    #[error("Config error: {0}")]
    Config(String),
}

/// Failures of the upstream content call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// HTTP 401.
    #[error("upstream rejected the token (401)")]
    Unauthorized { body: String },

    /// HTTP 403.
    #[error("upstream denied access to the document (403)")]
    Forbidden { body: String },

    /// Any other non-2xx status, or a platform error code on a 2xx.
    #[error("upstream returned HTTP {status}")]
    Http { status: u16, body: String },

    /// Transport failure: connect, TLS, timeout, truncated body.
    #[error("network failure: {0}")]
    Network(String),

    /// 2xx with a body that is not the expected JSON shape.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Caller-visible classification.
    pub fn kind(&self) -> FailureKind {
        match self {
            UpstreamError::Unauthorized { .. } => FailureKind::Unauthorized,
            UpstreamError::Forbidden { .. } => FailureKind::Forbidden,
            UpstreamError::Http { .. } => FailureKind::UpstreamHttpError,
            UpstreamError::Network(_) => FailureKind::NetworkFailure,
            UpstreamError::InvalidResponse(_) => FailureKind::InvalidResponse,
        }
    }

    /// HTTP status, when the failure came with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Unauthorized { .. } => Some(401),
            UpstreamError::Forbidden { .. } => Some(403),
            UpstreamError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body (already truncated), when there was one.
    pub fn body(&self) -> Option<&str> {
        match self {
            UpstreamError::Unauthorized { body }
            | UpstreamError::Forbidden { body }
            | UpstreamError::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}
