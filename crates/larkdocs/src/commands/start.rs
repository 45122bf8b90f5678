//! Start command - launches the relay server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::{info, warn};

use larkdocs_config::LarkdocsConfig;
use larkdocs_document::LarkDocumentClient;
use larkdocs_oauth::{CredentialManager, CredentialMode, CredentialSettings, OAuthConfig};
use larkdocs_server::{AppState, Server, ServerConfig};
use larkdocs_session::{SessionConfig, SessionManager};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file and environment values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Address to bind to (overrides config and MCP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config and MCP_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let mut loaded = ctx.load_config()?;
    if let Some(host) = args.host {
        loaded.config.server.host = Some(host);
    }
    if let Some(port) = args.port {
        loaded.config.server.port = Some(port);
    }
    let config = loaded.config;

    for path in loaded.sources.iter().filter(|s| s.loaded) {
        info!(path = %path.path.display(), "Loaded config");
    }

    let addr = bind_address(&config)?;

    let credentials = Arc::new(
        CredentialManager::new(credential_settings(&config))
            .context("Failed to initialize credentials")?,
    );
    match credentials.mode() {
        CredentialMode::Unconfigured => warn!(
            "No Lark credential configured; set LARKS_BEARER_TOKEN or \
             LARKS_CLIENT_ID and LARKS_CLIENT_SECRET"
        ),
        CredentialMode::OAuth => info!(
            login = %format!("http://{}/oauth/login", addr),
            "OAuth mode: open the login URL to authorize"
        ),
        CredentialMode::Static => {}
    }

    let documents = Arc::new(
        LarkDocumentClient::with_timeout(config.lark.api_domain(), config.lark.request_timeout())
            .context("Failed to build upstream client")?,
    );
    let sessions = Arc::new(SessionManager::new(session_config(&config)));

    let state = AppState::new(server_config(&config, addr), sessions, credentials, documents);

    if ctx.verbose {
        eprintln!("larkdocs listening on http://{}/mcp", addr);
    }

    Server::from_state(state).run().await?;
    Ok(())
}

/// Resolve the listen address from config.
pub fn bind_address(config: &LarkdocsConfig) -> Result<SocketAddr> {
    let host = config.server.host();
    let ip: IpAddr = match host {
        "localhost" => IpAddr::from([127, 0, 0, 1]),
        other => other
            .parse()
            .with_context(|| format!("Invalid bind host '{}'", other))?,
    };
    Ok(SocketAddr::new(ip, config.server.port()))
}

/// Credential settings; the credential manager picks the mode.
pub fn credential_settings(config: &LarkdocsConfig) -> CredentialSettings {
    let lark = &config.lark;
    let mut settings = CredentialSettings::new()
        .with_refresh_skew(lark.refresh_skew())
        .with_request_timeout(lark.request_timeout());

    if let Some(token) = &lark.bearer_token {
        settings = settings.with_bearer_token(token.clone());
    }

    if lark.has_oauth_client()
        && let (Some(id), Some(secret)) = (&lark.client_id, &lark.client_secret)
    {
        let oauth = OAuthConfig::new(id.clone(), secret.clone())
            .with_redirect_uri(lark.redirect_uri(config.server.port()))
            .with_domain(lark.domain())
            .with_api_domain(lark.api_domain());
        settings = settings.with_oauth(oauth);
    }

    if let Some(refresh_token) = &lark.refresh_token {
        settings = settings.with_refresh_token(refresh_token.clone());
    }

    settings
}

/// Session policy from the `[server]` section.
pub fn session_config(config: &LarkdocsConfig) -> SessionConfig {
    let session = SessionConfig::new().with_max_sessions(config.server.max_sessions());
    match config.server.session_idle_timeout() {
        Some(timeout) => session.with_idle_timeout(timeout),
        None => session.without_idle_timeout().with_cleanup_task(false),
    }
}

/// HTTP server settings.
pub fn server_config(config: &LarkdocsConfig, addr: SocketAddr) -> ServerConfig {
    ServerConfig::new()
        .with_bind_address(addr)
        .with_max_body_size(config.server.max_body_size())
        .with_cors_origins(config.server.cors_origins().to_vec())
}
