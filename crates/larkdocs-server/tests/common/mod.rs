//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use larkdocs_document::LarkDocumentClient;
use larkdocs_mcp::SESSION_HEADER;
use larkdocs_oauth::{CredentialManager, CredentialSettings};
use larkdocs_session::{SessionConfig, SessionManager};
use larkdocs_server::{AppState, Server, ServerConfig};

/// A relay running in the background against a mock upstream.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client that does not follow redirects.
    pub client: Client,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start with a static bearer token (`t-valid`) and `api_domain` as upstream.
    pub async fn start(api_domain: &str) -> Result<Self> {
        Self::start_with(
            CredentialSettings::new().with_bearer_token("t-valid"),
            api_domain,
        )
        .await
    }

    /// Start with explicit credential settings.
    pub async fn start_with(settings: CredentialSettings, api_domain: &str) -> Result<Self> {
        let addr = find_available_port().await?;

        let credentials = Arc::new(CredentialManager::new(settings)?);
        let documents = Arc::new(LarkDocumentClient::with_timeout(
            api_domain,
            Duration::from_secs(5),
        )?);
        let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
        let config = ServerConfig::default().with_bind_address(addr);

        let state = AppState::new(config, sessions, credentials, documents);
        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET a path on the server.
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    /// POST a raw JSON-RPC body to `/mcp`.
    pub async fn post_mcp(&self, body: &Value, session: Option<&str>) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(format!("{}/mcp", self.base_url()))
            .json(body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }
        Ok(request.send().await?)
    }

    /// Send a request and return the JSON-RPC response body.
    pub async fn rpc(
        &self,
        id: i64,
        method: &str,
        params: Value,
        session: Option<&str>,
    ) -> Result<Value> {
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self.post_mcp(&body, session).await?;
        anyhow::ensure!(
            response.status().is_success(),
            "unexpected status {}",
            response.status()
        );
        Ok(response.json().await?)
    }

    /// Run `initialize` and return the session id from the response header.
    pub async fn initialize(&self) -> Result<String> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "integration", "version": "1.0" }
            }
        });
        let response = self.post_mcp(&body, None).await?;
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .context("initialize response has no session header")?
            .to_str()?
            .to_string();
        Ok(session)
    }

    /// `tools/call` the document tool with `url`.
    pub async fn fetch_document(&self, session: &str, url: &str) -> Result<Value> {
        self.rpc(
            3,
            "tools/call",
            json!({ "name": "docs", "arguments": { "url": url } }),
            Some(session),
        )
        .await
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
