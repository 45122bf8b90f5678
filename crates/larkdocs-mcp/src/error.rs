//! Protocol-level error taxonomy.

use serde_json::{Value, json};
use thiserror::Error;

use crate::protocol::{JsonRpcError, RequestId};

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors surfaced to callers as JSON-RPC error objects.
///
/// Every variant has a numeric code and a stable `kind` string that is
/// placed in `error.data.kind`.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Request body is not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// Envelope is not a valid JSON-RPC request object.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Method is not served.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Method parameters failed validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Session id missing, unknown, expired or closed.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Client asked for a protocol version this server does not speak.
    #[error("unsupported protocol version '{requested}'")]
    UnsupportedProtocolVersion {
        /// Version sent by the client.
        requested: String,
        /// Versions this server accepts.
        supported: Vec<String>,
    },

    /// Every session slot is held by a live session.
    #[error("session limit reached ({0} live sessions)")]
    SessionLimitReached(usize),

    /// `tools/call` named a tool that does not exist.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Document URL could not be resolved to an identifier.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Unexpected server-side failure. The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// JSON-RPC error code.
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::Parse(_) => JsonRpcError::PARSE_ERROR,
            ProtocolError::InvalidRequest(_) => JsonRpcError::INVALID_REQUEST,
            ProtocolError::MethodNotFound(_) => JsonRpcError::METHOD_NOT_FOUND,
            ProtocolError::InvalidParams(_)
            | ProtocolError::UnknownTool(_)
            | ProtocolError::InvalidUrl(_) => JsonRpcError::INVALID_PARAMS,
            ProtocolError::UnknownSession(_) => JsonRpcError::UNKNOWN_SESSION,
            ProtocolError::UnsupportedProtocolVersion { .. } => {
                JsonRpcError::UNSUPPORTED_PROTOCOL_VERSION
            }
            ProtocolError::SessionLimitReached(_) => JsonRpcError::SESSION_LIMIT_REACHED,
            ProtocolError::Internal(_) => JsonRpcError::INTERNAL_ERROR,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Parse(_) => "ParseError",
            ProtocolError::InvalidRequest(_) => "InvalidRequest",
            ProtocolError::MethodNotFound(_) => "MethodNotFound",
            ProtocolError::InvalidParams(_) => "InvalidParams",
            ProtocolError::UnknownSession(_) => "UnknownSession",
            ProtocolError::UnsupportedProtocolVersion { .. } => "UnsupportedProtocolVersion",
            ProtocolError::SessionLimitReached(_) => "SessionLimitReached",
            ProtocolError::UnknownTool(_) => "UnknownTool",
            ProtocolError::InvalidUrl(_) => "InvalidUrl",
            ProtocolError::Internal(_) => "InternalError",
        }
    }

    /// Convert into a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let message = match self {
            ProtocolError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        let mut data = json!({ "kind": self.kind() });
        if let ProtocolError::UnsupportedProtocolVersion {
            requested,
            supported,
        } = self
            && let Value::Object(ref mut map) = data
        {
            map.insert("requested".to_string(), json!(requested));
            map.insert("supported".to_string(), json!(supported));
        }

        JsonRpcError::new(self.code(), message).with_data(data)
    }
}

/// An envelope that failed validation, with the id to answer under.
#[derive(Debug, Clone)]
pub struct EnvelopeError {
    /// Request id if it could be read, otherwise null.
    pub id: RequestId,
    /// What was wrong with the envelope.
    pub error: ProtocolError,
}

impl EnvelopeError {
    /// Create an envelope error.
    pub fn new(id: RequestId, error: ProtocolError) -> Self {
        Self { id, error }
    }
}
