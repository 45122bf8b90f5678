//! Protocol session lifecycle for the larkdocs MCP relay.
//!
//! Sessions are created on a successful `initialize`, looked up by the
//! `Mcp-Session-Id` header on every later request, and removed on
//! explicit close or idle timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use larkdocs_session::{SessionConfig, SessionManager};
//!
//! let config = SessionConfig::default()
//!     .with_max_sessions(1000)
//!     .with_idle_timeout(Duration::from_secs(1800));
//!
//! let manager = SessionManager::new(config);
//! let id = manager.create_session(client_info, "2024-11-05").await?;
//! ```

mod config;
mod error;
mod manager;
mod session;
mod ttl;

pub use config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SESSIONS, SessionConfig};
pub use error::{Result, SessionError};
pub use manager::{SessionManager, SessionStats};
pub use session::{Session, SessionId, SessionState};
pub use ttl::TtlTracker;
