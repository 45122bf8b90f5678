//! Configuration types.
//!
//! Every field is optional so that layers can be merged field by field;
//! the accessor methods supply defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 48080;

/// Default session idle timeout in seconds (30 minutes).
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default maximum number of protocol sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Default maximum request body size (1 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default Lark accounts domain.
pub const DEFAULT_DOMAIN: &str = "https://accounts.larksuite.com";

/// Default Lark open-platform API domain.
pub const DEFAULT_API_DOMAIN: &str = "https://open.larksuite.com";

/// Default refresh margin in seconds.
pub const DEFAULT_REFRESH_SKEW_SECS: u64 = 60;

/// Default upstream request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LarkdocsConfig {
    /// `[server]` section.
    pub server: ServerSection,
    /// `[lark]` section.
    pub lark: LarkSection,
}

/// `[server]`: listener and session policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_idle_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<usize>,
    /// Browser origins allowed to call the relay. Unset disables CORS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origins: Option<Vec<String>>,
}

/// `[lark]`: OAuth application, static token and upstream endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LarkSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_skew_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn overlay<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

fn has_value(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl LarkdocsConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority per field).
    pub fn merge(&mut self, other: LarkdocsConfig) {
        let s = other.server;
        overlay(&mut self.server.host, s.host);
        overlay(&mut self.server.port, s.port);
        overlay(
            &mut self.server.session_idle_timeout_secs,
            s.session_idle_timeout_secs,
        );
        overlay(&mut self.server.max_sessions, s.max_sessions);
        overlay(&mut self.server.max_body_size, s.max_body_size);
        overlay(&mut self.server.cors_origins, s.cors_origins);

        let l = other.lark;
        overlay(&mut self.lark.client_id, l.client_id);
        overlay(&mut self.lark.client_secret, l.client_secret);
        overlay(&mut self.lark.redirect_uri, l.redirect_uri);
        overlay(&mut self.lark.domain, l.domain);
        overlay(&mut self.lark.api_domain, l.api_domain);
        overlay(&mut self.lark.bearer_token, l.bearer_token);
        overlay(&mut self.lark.refresh_token, l.refresh_token);
        overlay(&mut self.lark.refresh_skew_secs, l.refresh_skew_secs);
        overlay(&mut self.lark.request_timeout_secs, l.request_timeout_secs);
    }

    /// Check values that would only fail later at startup.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_sessions == Some(0) {
            return Err(invalid("server.max_sessions", "must be at least 1"));
        }
        if self.server.max_body_size == Some(0) {
            return Err(invalid("server.max_body_size", "must be at least 1"));
        }
        if self.server.port == Some(0) {
            return Err(invalid("server.port", "must be non-zero"));
        }
        for (key, value) in [
            ("lark.redirect_uri", &self.lark.redirect_uri),
            ("lark.domain", &self.lark.domain),
            ("lark.api_domain", &self.lark.api_domain),
        ] {
            if let Some(v) = value
                && !(v.starts_with("http://") || v.starts_with("https://"))
            {
                return Err(invalid(key, "must be an http(s) URL"));
            }
        }
        Ok(())
    }

    /// Whether any secret is stored in the config itself.
    pub fn has_plaintext_secrets(&self) -> bool {
        has_value(&self.lark.client_secret)
            || has_value(&self.lark.bearer_token)
            || has_value(&self.lark.refresh_token)
    }

    /// Copy with secrets replaced for display.
    pub fn masked(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        let mut copy = self.clone();
        copy.lark.client_secret = mask(&self.lark.client_secret);
        copy.lark.bearer_token = mask(&self.lark.bearer_token);
        copy.lark.refresh_token = mask(&self.lark.refresh_token);
        copy
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl ServerSection {
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Idle timeout; `0` disables idle eviction.
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        match self
            .session_idle_timeout_secs
            .unwrap_or(DEFAULT_SESSION_IDLE_TIMEOUT_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions.unwrap_or(DEFAULT_MAX_SESSIONS)
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE)
    }

    pub fn cors_origins(&self) -> &[String] {
        self.cors_origins.as_deref().unwrap_or_default()
    }
}

impl LarkSection {
    /// Redirect URI, derived from the listen port when unset.
    pub fn redirect_uri(&self, port: u16) -> String {
        match &self.redirect_uri {
            Some(uri) if !uri.trim().is_empty() => uri.clone(),
            _ => format!("http://localhost:{}/oauth/callback", port),
        }
    }

    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or(DEFAULT_DOMAIN)
    }

    pub fn api_domain(&self) -> &str {
        self.api_domain.as_deref().unwrap_or(DEFAULT_API_DOMAIN)
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs.unwrap_or(DEFAULT_REFRESH_SKEW_SECS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Whether both OAuth client credentials are present.
    pub fn has_oauth_client(&self) -> bool {
        has_value(&self.client_id) && has_value(&self.client_secret)
    }

    pub fn has_bearer_token(&self) -> bool {
        has_value(&self.bearer_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let config = LarkdocsConfig::from_toml(
            r#"
[server]
host = "0.0.0.0"
port = 9000
session_idle_timeout_secs = 0
max_sessions = 50
cors_origins = ["http://localhost:5173"]

[lark]
client_id = "cli_abc"
client_secret = "s3cret"
api_domain = "https://open.feishu.cn"
refresh_skew_secs = 120
"#,
        )
        .unwrap();

        assert_eq!(config.server.host(), "0.0.0.0");
        assert_eq!(config.server.port(), 9000);
        assert!(config.server.session_idle_timeout().is_none());
        assert_eq!(config.server.max_sessions(), 50);
        assert_eq!(config.server.cors_origins(), ["http://localhost:5173"]);
        assert_eq!(config.lark.api_domain(), "https://open.feishu.cn");
        assert_eq!(config.lark.domain(), DEFAULT_DOMAIN);
        assert_eq!(config.lark.refresh_skew(), Duration::from_secs(120));
        assert!(config.lark.has_oauth_client());
    }

    #[test]
    fn test_defaults() {
        let config = LarkdocsConfig::new();
        assert_eq!(config.server.host(), DEFAULT_HOST);
        assert_eq!(config.server.port(), 48080);
        assert_eq!(
            config.server.session_idle_timeout(),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(
            config.lark.redirect_uri(48080),
            "http://localhost:48080/oauth/callback"
        );
        assert!(!config.lark.has_oauth_client());
        assert!(!config.has_plaintext_secrets());
        assert!(config.server.cors_origins().is_empty());
    }

    #[test]
    fn test_merge_is_field_by_field() {
        let mut base = LarkdocsConfig::from_toml(
            r#"
[server]
port = 8000
host = "0.0.0.0"

[lark]
client_id = "base"
"#,
        )
        .unwrap();
        let over = LarkdocsConfig::from_toml(
            r#"
[server]
port = 9000
"#,
        )
        .unwrap();

        base.merge(over);
        assert_eq!(base.server.port(), 9000);
        assert_eq!(base.server.host(), "0.0.0.0");
        assert_eq!(base.lark.client_id.as_deref(), Some("base"));
    }

    #[test]
    fn test_validate() {
        let mut config = LarkdocsConfig::new();
        assert!(config.validate().is_ok());

        config.server.max_sessions = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "server.max_sessions"
        ));

        let mut config = LarkdocsConfig::new();
        config.lark.api_domain = Some("open.larksuite.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_masked_hides_secrets() {
        let mut config = LarkdocsConfig::new();
        config.lark.client_id = Some("cli_abc".to_string());
        config.lark.client_secret = Some("s3cret".to_string());
        config.lark.bearer_token = Some("t-123".to_string());

        assert!(config.has_plaintext_secrets());
        let rendered = config.masked().to_toml().unwrap();
        assert!(rendered.contains("cli_abc"));
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("t-123"));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = LarkdocsConfig::from_toml("[server]\nport = 1\nunknown = true\n").unwrap();
        assert_eq!(config.server.port(), 1);
    }
}
