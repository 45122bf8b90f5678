//! Error types for session operations.

use larkdocs_mcp::ProtocolError;

/// Error type for session operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Session id is missing, malformed, unknown, idle-expired or closed.
    #[error("Session not found: {0}")]
    UnknownSession(String),

    /// The requested protocol version is not accepted.
    #[error("Unsupported protocol version '{requested}'")]
    UnsupportedProtocolVersion {
        /// Version sent by the client.
        requested: String,
        /// Versions this server accepts.
        supported: Vec<String>,
    },

    /// The store is full and no session is idle-expired.
    #[error("Session limit reached ({max} live sessions)")]
    LimitReached {
        /// Configured maximum.
        max: usize,
    },
}

impl From<SessionError> for ProtocolError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownSession(id) => ProtocolError::UnknownSession(id),
            SessionError::UnsupportedProtocolVersion {
                requested,
                supported,
            } => ProtocolError::UnsupportedProtocolVersion {
                requested,
                supported,
            },
            SessionError::LimitReached { max } => ProtocolError::SessionLimitReached(max),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
