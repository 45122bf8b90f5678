//! Error types for credential handling.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while producing a bearer credential.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OAuthError {
    /// No token is available: nothing configured, or OAuth not yet authorized.
    #[error("No credential available")]
    NoCredential,

    /// The refresh token was rejected; the authorization flow must be re-run.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::Network(e.to_string())
    }
}
