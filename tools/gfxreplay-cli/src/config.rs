//! Config command - show the effective configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use gfxreplay_core::Config;
use gfxreplay_core::config::{self as settings, config_path};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Read this file instead of the platform config.toml
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Only print where the config file lives
    #[arg(long)]
    pub locate: bool,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    if args.locate {
        match args.path.or_else(config_path) {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("Could not determine the config directory"),
        }
        return Ok(());
    }

    let config = load(args.path.as_deref())?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    print!("{rendered}");
    Ok(())
}

/// Load an explicit config file, or the platform one with defaults as fallback
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => settings::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(settings::load()),
    }
}
