//! Lark OAuth 2.0 authorization-code flow and token endpoint client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{OAuthError, Result};

/// Default accounts domain used for the authorization page.
pub const DEFAULT_DOMAIN: &str = "https://accounts.larksuite.com";

/// Default open-platform API domain used for token exchange.
pub const DEFAULT_API_DOMAIN: &str = "https://open.larksuite.com";

/// Default listen port of the relay, used to derive the redirect URI.
pub const DEFAULT_PORT: u16 = 48080;

/// Scopes requested for read-only document access.
pub const DEFAULT_SCOPE: &str =
    "docx:document:readonly docs:document.content:read drive:drive.metadata:readonly";

/// Path of the v2 token endpoint under the API domain.
const TOKEN_PATH: &str = "/open-apis/authen/v2/oauth/token";

/// Path of the authorization page under the accounts domain.
const AUTHORIZE_PATH: &str = "/open-apis/authen/v1/index";

/// Default redirect URI for a relay listening on `port`.
pub fn default_redirect_uri(port: u16) -> String {
    format!("http://localhost:{}/oauth/callback", port)
}

/// OAuth application configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub domain: String,
    pub api_domain: String,
    pub scope: String,
}

impl OAuthConfig {
    /// Create a config for an application with Lark defaults for everything else.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: default_redirect_uri(DEFAULT_PORT),
            domain: DEFAULT_DOMAIN.to_string(),
            api_domain: DEFAULT_API_DOMAIN.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_api_domain(mut self, api_domain: impl Into<String>) -> Self {
        self.api_domain = api_domain.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Whether both client id and secret are present.
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}{}", self.api_domain.trim_end_matches('/'), TOKEN_PATH)
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("domain", &self.domain)
            .field("api_domain", &self.api_domain)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Shorten an identifier for logs.
pub fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(6).collect();
    if prefix.len() < value.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

/// Build the authorization URL the user opens in a browser.
pub fn build_authorization_url(config: &OAuthConfig, state: &str) -> String {
    let params = [
        ("app_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("state", state),
        ("scope", config.scope.as_str()),
    ];

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}{}?{}",
        config.domain.trim_end_matches('/'),
        AUTHORIZE_PATH,
        query
    )
}

/// Access/refresh token pair issued by the token endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// `None` when the endpoint gave no lifetime; such a token is never
    /// refreshed proactively.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    /// Whether the access token is within `skew` of expiring (or past it).
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                let skew = TimeDelta::from_std(skew).unwrap_or(TimeDelta::zero());
                Utc::now() >= expires_at - skew
            }
        }
    }

    /// Seconds until expiry, negative once expired.
    pub fn expires_in_secs(&self) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"***")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token fields as they appear in the endpoint response.
#[derive(Debug, Deserialize)]
struct TokenPayload {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Which grant a token request used; decides how a rejection is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
        }
    }

    fn rejected(self, reason: String) -> OAuthError {
        match self {
            Grant::AuthorizationCode => {
                OAuthError::InvalidRequest(format!("authorization code rejected: {}", reason))
            }
            Grant::RefreshToken => OAuthError::AuthExpired(reason),
        }
    }
}

/// Interpret a token endpoint response.
///
/// The token may sit at the top level or under `data`. An `error` field or
/// a non-zero `code` is a rejection, as is any 4xx status. 5xx statuses are
/// treated as transport trouble so existing tokens are kept.
pub fn parse_token_response(grant: Grant, status: u16, body: &str) -> Result<OAuthTokens> {
    let success = (200..300).contains(&status);
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let Some(value) = parsed else {
        let snippet: String = body.chars().take(200).collect();
        return Err(match status {
            400..=499 => grant.rejected(format!("HTTP {}: {}", status, snippet)),
            _ if success => {
                OAuthError::Serialization(format!("invalid JSON from token endpoint: {}", snippet))
            }
            _ => OAuthError::Network(format!("token endpoint returned HTTP {}", status)),
        });
    };

    let message = value
        .get("msg")
        .or_else(|| value.get("error_description"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    if !success {
        return Err(match status {
            400..=499 => grant.rejected(format!("HTTP {}: {}", status, message)),
            _ => OAuthError::Network(format!("token endpoint returned HTTP {}: {}", status, message)),
        });
    }

    if let Some(error) = value.get("error").and_then(Value::as_str)
        && !error.is_empty()
    {
        return Err(grant.rejected(format!("{} - {}", error, message)));
    }

    if let Some(code) = value.get("code").and_then(Value::as_i64)
        && code != 0
    {
        return Err(grant.rejected(format!("code {}: {}", code, message)));
    }

    let token_data = if value.get("access_token").is_some() {
        value
    } else {
        value.get("data").cloned().unwrap_or(Value::Null)
    };

    let payload: TokenPayload = serde_json::from_value(token_data)
        .map_err(|e| OAuthError::Serialization(format!("malformed token payload: {}", e)))?;

    let access_token = payload
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::Serialization("no access token in response".to_string()))?;

    let expires_at = payload
        .expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| Utc::now() + TimeDelta::seconds(secs));

    Ok(OAuthTokens {
        access_token,
        refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
        token_type: payload.token_type,
        scope: payload.scope,
        expires_at,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Token endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// Performs the token HTTP calls.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens>;

    /// Trade a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens>;
}

/// Default request timeout for token calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-backed [`TokenEndpoint`] for the Lark v2 token API.
pub struct HttpTokenEndpoint {
    config: OAuthConfig,
    client: reqwest::Client,
}

impl HttpTokenEndpoint {
    /// Create an endpoint client with the default timeout.
    pub fn new(config: OAuthConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Create an endpoint client with a custom request timeout.
    pub fn with_timeout(config: OAuthConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OAuthError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn post_token(&self, grant: Grant, mut body: Value) -> Result<OAuthTokens> {
        if let Value::Object(ref mut map) = body {
            map.insert("grant_type".to_string(), json!(grant.as_str()));
            map.insert("client_id".to_string(), json!(self.config.client_id));
            map.insert("client_secret".to_string(), json!(self.config.client_secret));
        }

        tracing::debug!(
            grant = grant.as_str(),
            client_id = %redact(&self.config.client_id),
            "Requesting token"
        );

        let response = self
            .client
            .post(self.config.token_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| OAuthError::Network(format!("token request failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| OAuthError::Network(format!("failed to read token response: {}", e)))?;

        let result = parse_token_response(grant, status, &text);
        if let Err(ref e) = result {
            tracing::warn!(grant = grant.as_str(), status, error = %e, "Token request failed");
        }
        result
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens> {
        self.post_token(
            Grant::AuthorizationCode,
            json!({ "code": code, "redirect_uri": self.config.redirect_uri }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<OAuthTokens> {
        self.post_token(Grant::RefreshToken, json!({ "refresh_token": refresh_token }))
            .await
    }
}
