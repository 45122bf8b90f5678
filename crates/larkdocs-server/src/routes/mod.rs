//! HTTP routes.

pub mod health;
pub mod mcp;
pub mod oauth;

pub use health::{HealthResponse, health_routes};
pub use mcp::{SESSION_HEADER_NAME, mcp_delete_handler, mcp_post_handler, mcp_routes};
pub use oauth::{CallbackParams, CallbackResponse, oauth_routes};
