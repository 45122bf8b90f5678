//! Environment variable overrides.
//!
//! Environment values take precedence over every file layer. Empty values
//! are ignored so that an exported-but-blank variable does not clear a
//! file setting.

use crate::types::LarkdocsConfig;

pub const ENV_CLIENT_ID: &str = "LARKS_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "LARKS_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "LARKS_REDIRECT_URI";
pub const ENV_DOMAIN: &str = "LARKS_DOMAIN";
pub const ENV_API_DOMAIN: &str = "LARKS_API_DOMAIN";
pub const ENV_BEARER_TOKEN: &str = "LARKS_BEARER_TOKEN";
pub const ENV_REFRESH_TOKEN: &str = "LARKS_REFRESH_TOKEN";
pub const ENV_HOST: &str = "MCP_HOST";
pub const ENV_PORT: &str = "MCP_PORT";

/// Apply overrides from the process environment.
pub fn apply_process_env(config: &mut LarkdocsConfig, warnings: &mut Vec<String>) {
    apply_env_overrides(config, |key| std::env::var(key).ok(), warnings);
}

/// Apply overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut LarkdocsConfig, lookup: F, warnings: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let lark = &mut config.lark;
    for (key, slot) in [
        (ENV_CLIENT_ID, &mut lark.client_id),
        (ENV_CLIENT_SECRET, &mut lark.client_secret),
        (ENV_REDIRECT_URI, &mut lark.redirect_uri),
        (ENV_DOMAIN, &mut lark.domain),
        (ENV_API_DOMAIN, &mut lark.api_domain),
        (ENV_BEARER_TOKEN, &mut lark.bearer_token),
        (ENV_REFRESH_TOKEN, &mut lark.refresh_token),
    ] {
        if let Some(value) = get(key) {
            *slot = Some(value);
        }
    }

    if let Some(host) = get(ENV_HOST) {
        config.server.host = Some(host);
    }

    if let Some(port) = get(ENV_PORT) {
        match port.parse::<u16>() {
            Ok(p) if p != 0 => config.server.port = Some(p),
            _ => warnings.push(format!(
                "Ignoring {}={:?}: not a valid port number",
                ENV_PORT, port
            )),
        }
    }
}
