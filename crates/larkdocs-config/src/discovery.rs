//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/larkdocs/config.toml` (user config)
//! 2. `./larkdocs.toml` (project-local)
//! 3. An explicit `--config` file
//! 4. Environment variables

use std::path::{Path, PathBuf};

use crate::env::apply_process_env;
use crate::{ConfigError, LarkdocsConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "larkdocs.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for config directory resolution.
const APP_NAME: &str = "larkdocs";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "LARKDOCS_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: LarkdocsConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (skipped files, plaintext secrets).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Where to look for config layers.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Directory holding the user `config.toml`. `None` uses
    /// `LARKDOCS_CONFIG_DIR` or the platform default.
    pub config_dir: Option<PathBuf>,
    /// Directory holding `larkdocs.toml`. `None` uses the working directory.
    pub project_dir: Option<PathBuf>,
    /// Explicit config file; failure to load it is an error.
    pub explicit: Option<PathBuf>,
    /// Skip environment overrides.
    pub skip_env: bool,
}

/// Load configuration from all layers and the process environment.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(&LoadOptions {
        explicit: explicit.map(Path::to_path_buf),
        ..Default::default()
    })
}

/// Load configuration with explicit control over each layer.
pub fn load_config_with_options(options: &LoadOptions) -> Result<LoadedConfig> {
    let mut config = LarkdocsConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    // 1. User config
    let user_config_path = match &options.config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    // 2. Project-local config
    let project_path = options
        .project_dir
        .as_ref()
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    // 3. Explicit file
    if let Some(path) = &options.explicit {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.clone(),
            loaded: true,
        });
    }

    // Only file-held secrets warn.
    check_plaintext_secrets(&config, &mut warnings);

    // 4. Environment
    if !options.skip_env {
        apply_process_env(&mut config, &mut warnings);
    }

    config.validate()?;

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<LarkdocsConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    LarkdocsConfig::from_toml(&contents)
}

/// Get the user config file path.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the user config directory for larkdocs.
///
/// Checks `LARKDOCS_CONFIG_DIR` first, then falls back to the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
///
/// Missing files are skipped silently, unreadable or malformed ones with a
/// warning.
fn load_layer(config: &mut LarkdocsConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

fn check_plaintext_secrets(config: &LarkdocsConfig, warnings: &mut Vec<String>) {
    if config.has_plaintext_secrets() {
        warnings.push(
            "[lark] contains a plaintext secret. \
             Consider setting LARKS_CLIENT_SECRET / LARKS_BEARER_TOKEN in the environment instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
