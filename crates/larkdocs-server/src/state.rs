//! Application state shared across handlers.

use std::sync::Arc;

use larkdocs_document::DocumentSource;
use larkdocs_oauth::CredentialManager;
use larkdocs_session::SessionManager;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;

/// Application state shared across all handlers.
///
/// Every component is constructed once at startup and handed in here; no
/// handler reaches for process-wide state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Protocol session store.
    pub sessions: Arc<SessionManager>,

    /// Bearer credential source for upstream calls.
    pub credentials: Arc<CredentialManager>,

    /// JSON-RPC method router.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Create application state from its components.
    pub fn new(
        config: ServerConfig,
        sessions: Arc<SessionManager>,
        credentials: Arc<CredentialManager>,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        let dispatcher = Dispatcher::new(sessions.clone(), credentials.clone(), documents);
        Self {
            config: Arc::new(config),
            sessions,
            credentials,
            dispatcher: Arc::new(dispatcher),
        }
    }
}
