//! CLI command handlers.

pub mod config;
pub mod start;

use std::path::PathBuf;

use anyhow::Result;
use larkdocs_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file from `--config`.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load layered config and print any warnings to stderr.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = larkdocs_config::load_config(self.config_path.as_deref())?;
        for warning in &loaded.warnings {
            eprintln!("warning: {}", warning);
        }
        Ok(loaded)
    }
}
