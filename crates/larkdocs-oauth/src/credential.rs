//! Credential manager: static token pass-through or OAuth with refresh.
//!
//! The mode is fixed when the manager is built. In OAuth mode the token
//! pair lives in a single state cell; refresh is single-flight so that
//! concurrent callers observing an expiring token share one network call
//! and an older refresh can never overwrite a newer pair. Callers that
//! queued behind a failed refresh get that failure instead of retrying.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::{OAuthError, Result};
use crate::oauth::{
    HttpTokenEndpoint, OAuthConfig, OAuthTokens, TokenEndpoint, build_authorization_url,
    generate_state, redact,
};

/// Default refresh margin before expiry.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Smallest accepted refresh margin.
pub const MIN_REFRESH_SKEW: Duration = Duration::from_secs(5);

/// How long an issued authorization state stays valid.
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on outstanding authorization states.
const MAX_PENDING_STATES: usize = 64;

/// Inputs for building a [`CredentialManager`].
#[derive(Clone, Default)]
pub struct CredentialSettings {
    /// Static bearer token. Takes priority over OAuth when present.
    pub bearer_token: Option<String>,
    /// OAuth application; used only when client id and secret are both set.
    pub oauth: Option<OAuthConfig>,
    /// Refresh token to seed the OAuth state with.
    pub refresh_token: Option<String>,
    /// Margin before expiry at which the access token is refreshed.
    pub refresh_skew: Option<Duration>,
    /// Timeout for token endpoint calls.
    pub request_timeout: Option<Duration>,
}

impl CredentialSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_oauth(mut self, config: OAuthConfig) -> Self {
        self.oauth = Some(config);
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = Some(skew);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The mode these settings select.
    pub fn mode(&self) -> CredentialMode {
        if non_empty(&self.bearer_token).is_some() {
            CredentialMode::Static
        } else if self.oauth.as_ref().is_some_and(OAuthConfig::is_complete) {
            CredentialMode::OAuth
        } else {
            CredentialMode::Unconfigured
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Which credential source is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    Static,
    #[serde(rename = "oauth")]
    OAuth,
    Unconfigured,
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialMode::Static => "static",
            CredentialMode::OAuth => "oauth",
            CredentialMode::Unconfigured => "unconfigured",
        };
        f.write_str(s)
    }
}

/// A freshly issued authorization request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Diagnostic view of the credential; never includes the token itself.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub mode: CredentialMode,
    pub has_token: bool,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuth state
// ─────────────────────────────────────────────────────────────────────────────

enum TokenState {
    /// Not yet authorized.
    Empty,
    Active(OAuthTokens),
    /// Refresh was rejected; a new authorization is required.
    Revoked(String),
}

/// Result of the most recent refresh attempt.
#[derive(Default)]
struct RefreshRecord {
    /// Number of completed refresh attempts.
    generation: u64,
    last_error: Option<OAuthError>,
}

struct OAuthCredential {
    config: OAuthConfig,
    endpoint: Arc<dyn TokenEndpoint>,
    state: RwLock<TokenState>,
    /// Held for the duration of any refresh or token replacement.
    refresh_lock: Mutex<RefreshRecord>,
    /// Mirrors `RefreshRecord::generation` for reads outside the lock.
    refresh_generation: AtomicU64,
    pending_states: Mutex<HashMap<String, Instant>>,
}

enum Credential {
    Static(String),
    OAuth(Box<OAuthCredential>),
    Unconfigured,
}

/// Produces valid bearer tokens on demand.
pub struct CredentialManager {
    credential: Credential,
    skew: Duration,
}

impl CredentialManager {
    /// Build from settings, using the HTTP token endpoint in OAuth mode.
    pub fn new(settings: CredentialSettings) -> Result<Self> {
        let endpoint: Option<Arc<dyn TokenEndpoint>> = match (&settings.oauth, settings.mode()) {
            (Some(config), CredentialMode::OAuth) => {
                let timeout = settings.request_timeout.unwrap_or(Duration::from_secs(30));
                Some(Arc::new(HttpTokenEndpoint::with_timeout(
                    config.clone(),
                    timeout,
                )?))
            }
            _ => None,
        };
        Ok(Self::build(settings, endpoint))
    }

    /// Build from settings with a caller-supplied token endpoint.
    pub fn with_endpoint(settings: CredentialSettings, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self::build(settings, Some(endpoint))
    }

    fn build(settings: CredentialSettings, endpoint: Option<Arc<dyn TokenEndpoint>>) -> Self {
        let skew = settings
            .refresh_skew
            .unwrap_or(DEFAULT_REFRESH_SKEW)
            .max(MIN_REFRESH_SKEW);
        let mode = settings.mode();

        let credential = match mode {
            CredentialMode::Static => match non_empty(&settings.bearer_token) {
                Some(token) => Credential::Static(token.to_string()),
                None => Credential::Unconfigured,
            },
            CredentialMode::OAuth => match (settings.oauth, endpoint) {
                (Some(config), Some(endpoint)) => {
                    let state = match non_empty(&settings.refresh_token) {
                        // Already expired so the first use exchanges the refresh token.
                        Some(refresh_token) => TokenState::Active(OAuthTokens {
                            access_token: String::new(),
                            refresh_token: Some(refresh_token.to_string()),
                            token_type: None,
                            scope: None,
                            expires_at: Some(DateTime::<Utc>::UNIX_EPOCH),
                        }),
                        None => TokenState::Empty,
                    };
                    Credential::OAuth(Box::new(OAuthCredential {
                        config,
                        endpoint,
                        state: RwLock::new(state),
                        refresh_lock: Mutex::new(RefreshRecord::default()),
                        refresh_generation: AtomicU64::new(0),
                        pending_states: Mutex::new(HashMap::new()),
                    }))
                }
                _ => Credential::Unconfigured,
            },
            CredentialMode::Unconfigured => Credential::Unconfigured,
        };

        match &credential {
            Credential::OAuth(oauth) => tracing::info!(
                mode = %mode,
                client_id = %redact(&oauth.config.client_id),
                "Credential manager ready"
            ),
            _ => tracing::info!(mode = %mode, "Credential manager ready"),
        }

        Self { credential, skew }
    }

    /// The selected mode.
    pub fn mode(&self) -> CredentialMode {
        match self.credential {
            Credential::Static(_) => CredentialMode::Static,
            Credential::OAuth(_) => CredentialMode::OAuth,
            Credential::Unconfigured => CredentialMode::Unconfigured,
        }
    }

    /// Refresh margin in effect.
    pub fn refresh_skew(&self) -> Duration {
        self.skew
    }

    /// Return a currently valid bearer token.
    ///
    /// Static tokens are returned unchanged without any expiry check. In
    /// OAuth mode an expiring token is refreshed first; concurrent callers
    /// wait for the one refresh in flight and then read its result.
    pub async fn get_authorization(&self) -> Result<String> {
        match &self.credential {
            Credential::Static(token) => Ok(token.clone()),
            Credential::Unconfigured => Err(OAuthError::NoCredential),
            Credential::OAuth(oauth) => oauth.get_authorization(self.skew).await,
        }
    }

    /// Start the authorization-code flow.
    pub async fn begin_authorization(&self) -> Result<AuthorizationRequest> {
        let Credential::OAuth(oauth) = &self.credential else {
            return Err(OAuthError::Config("OAuth is not configured".to_string()));
        };

        let state = generate_state();
        let url = build_authorization_url(&oauth.config, &state);

        let mut pending = oauth.pending_states.lock().await;
        pending.retain(|_, issued| issued.elapsed() < STATE_TTL);
        if pending.len() >= MAX_PENDING_STATES
            && let Some(oldest) = pending
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(s, _)| s.clone())
        {
            pending.remove(&oldest);
        }
        pending.insert(state.clone(), Instant::now());

        Ok(AuthorizationRequest { url, state })
    }

    /// Authorization URL to show a caller that has no usable token.
    ///
    /// Reuses the newest pending state while it has at least half its
    /// lifetime left, so repeated failures do not crowd out a login in
    /// progress. `None` outside OAuth mode.
    pub async fn authorization_url(&self) -> Option<String> {
        let Credential::OAuth(oauth) = &self.credential else {
            return None;
        };

        {
            let pending = oauth.pending_states.lock().await;
            let newest = pending
                .iter()
                .filter(|(_, issued)| issued.elapsed() < STATE_TTL / 2)
                .max_by_key(|(_, issued)| **issued);
            if let Some((state, _)) = newest {
                return Some(build_authorization_url(&oauth.config, state));
            }
        }

        self.begin_authorization().await.ok().map(|req| req.url)
    }

    /// Finish the authorization-code flow.
    ///
    /// The state must be one issued by [`begin_authorization`](Self::begin_authorization)
    /// and is consumed either way.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<CredentialStatus> {
        let Credential::OAuth(oauth) = &self.credential else {
            return Err(OAuthError::Config("OAuth is not configured".to_string()));
        };

        let issued = oauth.pending_states.lock().await.remove(state);
        match issued {
            Some(issued) if issued.elapsed() < STATE_TTL => {}
            _ => {
                tracing::warn!("OAuth callback with unknown or expired state");
                return Err(OAuthError::InvalidRequest(
                    "unknown or expired OAuth state".to_string(),
                ));
            }
        }

        if code.trim().is_empty() {
            return Err(OAuthError::InvalidRequest(
                "missing authorization code".to_string(),
            ));
        }

        let tokens = oauth.endpoint.exchange_code(code.trim()).await?;

        {
            // Serialize with refresh so an in-flight refresh cannot land afterwards.
            let _guard = oauth.refresh_lock.lock().await;
            *oauth.state.write().await = TokenState::Active(tokens);
        }

        tracing::info!("OAuth authorization completed");
        Ok(self.status().await)
    }

    /// Current credential status for diagnostics.
    pub async fn status(&self) -> CredentialStatus {
        let mut status = CredentialStatus {
            mode: self.mode(),
            has_token: false,
            is_expired: false,
            expires_at: None,
            expires_in_secs: None,
            revoked_reason: None,
        };

        match &self.credential {
            Credential::Static(_) => status.has_token = true,
            Credential::Unconfigured => {}
            Credential::OAuth(oauth) => match &*oauth.state.read().await {
                TokenState::Empty => {}
                TokenState::Revoked(reason) => {
                    status.is_expired = true;
                    status.revoked_reason = Some(reason.clone());
                }
                TokenState::Active(tokens) => {
                    status.has_token = !tokens.access_token.is_empty();
                    status.is_expired = tokens.needs_refresh(self.skew);
                    status.expires_at = tokens.expires_at;
                    status.expires_in_secs = tokens.expires_in_secs();
                }
            },
        }

        status
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("mode", &self.mode())
            .field("skew", &self.skew)
            .finish()
    }
}

impl OAuthCredential {
    async fn get_authorization(&self, skew: Duration) -> Result<String> {
        let observed = self.refresh_generation.load(Ordering::Acquire);

        // Fast path: shared read of a valid token.
        if let Some(token) = Self::usable_token(&*self.state.read().await, skew)? {
            return Ok(token);
        }

        let mut record = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let refresh_token = {
            let state = self.state.read().await;
            if let Some(token) = Self::usable_token(&state, skew)? {
                return Ok(token);
            }
            if record.generation != observed
                && let Some(err) = &record.last_error
            {
                return Err(err.clone());
            }
            match &*state {
                TokenState::Active(tokens) => tokens.refresh_token.clone(),
                _ => None,
            }
        };

        let Some(refresh_token) = refresh_token else {
            let reason = "access token expired and no refresh token is available".to_string();
            *self.state.write().await = TokenState::Revoked(reason.clone());
            return Err(OAuthError::AuthExpired(reason));
        };

        tracing::info!("Access token expiring, refreshing");

        let outcome = self.endpoint.refresh(&refresh_token).await;
        record.generation += 1;
        record.last_error = outcome.as_ref().err().cloned();
        self.refresh_generation.store(record.generation, Ordering::Release);

        match outcome {
            Ok(mut tokens) => {
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                }
                let access_token = tokens.access_token.clone();
                *self.state.write().await = TokenState::Active(tokens);
                tracing::info!("Token refreshed successfully");
                Ok(access_token)
            }
            Err(OAuthError::AuthExpired(reason)) => {
                tracing::warn!(reason = %reason, "Refresh token rejected, re-authorization required");
                *self.state.write().await = TokenState::Revoked(reason.clone());
                Err(OAuthError::AuthExpired(reason))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, keeping current tokens");
                Err(e)
            }
        }
    }

    /// `Ok(Some)` for a token that needs no refresh, `Ok(None)` when a
    /// refresh should be attempted, `Err` when no refresh can help.
    fn usable_token(state: &TokenState, skew: Duration) -> Result<Option<String>> {
        match state {
            TokenState::Empty => Err(OAuthError::NoCredential),
            TokenState::Revoked(reason) => Err(OAuthError::AuthExpired(reason.clone())),
            TokenState::Active(tokens) if !tokens.needs_refresh(skew) => {
                Ok(Some(tokens.access_token.clone()))
            }
            TokenState::Active(_) => Ok(None),
        }
    }
}
