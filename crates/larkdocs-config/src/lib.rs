//! Configuration for the larkdocs relay.
//!
//! Provides TOML-based configuration with:
//! - `[server]` listener and session policy
//! - `[lark]` OAuth application, static token and API endpoints
//! - Config file layering (user config + project-local + explicit file)
//! - Environment overrides (`LARKS_*`, `MCP_HOST`, `MCP_PORT`)

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadOptions, LoadedConfig, load_config, load_config_file,
    load_config_with_options, user_config_dir, user_config_path,
};
pub use env::{apply_env_overrides, apply_process_env};
pub use error::{ConfigError, Result};
pub use types::*;
