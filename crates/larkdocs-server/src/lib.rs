//! HTTP transport and MCP dispatcher for larkdocs.
//!
//! Serves the document-fetch tool over JSON-RPC on a single `/mcp`
//! endpoint, plus liveness and OAuth routes.
//!
//! # Example
//!
//! ```ignore
//! use larkdocs_server::{AppState, Server, ServerConfig};
//!
//! let state = AppState::new(config, sessions, credentials, documents);
//! Server::from_state(state).run().await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod routes;
pub mod state;
pub mod tool;

pub use config::ServerConfig;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{Result, ServerError};
pub use state::AppState;
pub use tool::{DocumentArgs, DocumentTool, TOOL_ALIAS, TOOL_NAME};

use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The larkdocs HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(routes::health_routes())
            .merge(routes::mcp_routes())
            .merge(routes::oauth_routes())
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size))
            .layer(TraceLayer::new_for_http());

        if let Some(cors) = self.cors_layer() {
            router = router.layer(cors);
        }

        router.with_state(self.state.clone())
    }

    fn cors_layer(&self) -> Option<CorsLayer> {
        let origins: Vec<HeaderValue> = self
            .state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        if origins.is_empty() {
            return None;
        }

        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, routes::SESSION_HEADER_NAME])
                .expose_headers([routes::SESSION_HEADER_NAME]),
        )
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_with_shutdown(addr, shutdown_signal()).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_with_shutdown(addr, std::future::pending()).await
    }

    /// Run on `addr` until `signal` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown<F>(self, addr: SocketAddr, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        let cleanup = self.state.sessions.spawn_cleanup_task();

        info!(address = %addr, "Starting server");

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        if let Some(handle) = cleanup {
            handle.abort();
        }
        info!("Server stopped");

        served
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
