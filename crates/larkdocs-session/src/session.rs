//! Session records and identifiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use larkdocs_mcp::ClientInfo;
use uuid::Uuid;

/// Opaque, unguessable session identifier.
///
/// Rendered on the wire as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle state of a session.
///
/// Transitions only move forward: `Created -> Ready -> Closed`, or
/// directly `Created -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A negotiated protocol session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub client_info: ClientInfo,
    pub protocol_version: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Session {
    /// Create a session in the `Created` state.
    pub fn new(client_info: ClientInfo, protocol_version: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            state: SessionState::Created,
            client_info,
            protocol_version: protocol_version.into(),
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Move `Created -> Ready`. Returns false for any other starting state.
    pub fn mark_ready(&mut self) -> bool {
        if self.state == SessionState::Created {
            self.state = SessionState::Ready;
            true
        } else {
            false
        }
    }

    /// Move to `Closed`. Terminal.
    pub fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Record activity.
    pub fn touch(&mut self) {
        self.last_seen_at = Utc::now();
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}
