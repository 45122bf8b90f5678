//! Config command - inspect the resolved configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use larkdocs_config::LarkdocsConfig;

use super::Context;
use super::start::{bind_address, credential_settings};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration with secrets masked (default)
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;
    let mode = credential_settings(config).mode();
    let masked = config.masked();

    if ctx.json_output {
        let output = json!({
            "credential_mode": mode,
            "listen": bind_address(config)?.to_string(),
            "sources": loaded
                .loaded_from()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
            "config": masked,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# larkdocs configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults and environment)\n");
    } else {
        println!("Config files:");
        for source in sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Credential mode: {}", mode);
    println!("Listen:          {}", bind_address(config)?);
    println!("API domain:      {}", config.lark.api_domain());
    println!(
        "Redirect URI:    {}",
        config.lark.redirect_uri(config.server.port())
    );
    println!();

    print_effective(&masked)?;
    Ok(())
}

fn print_effective(masked: &LarkdocsConfig) -> Result<()> {
    let toml_str = masked.to_toml()?;
    if toml_str.trim().is_empty() {
        println!("(no values set)");
    } else {
        println!("---\nEffective config:\n");
        println!("{}", toml_str);
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }
    println!("  + environment (LARKS_*, MCP_HOST, MCP_PORT)");

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_path() -> Result<()> {
    match larkdocs_config::user_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("No config directory available on this platform"),
    }
    Ok(())
}
