//! gfxreplay CLI - inspect and replay graphics API traces
//!
//! # Commands
//!
//! - `gfxreplay info` - Print the trace header and a packet histogram
//! - `gfxreplay dump` - List packets, optionally decoded by the API controller
//! - `gfxreplay replay` - Replay a trace headlessly through the API replayers
//! - `gfxreplay config` - Show the effective configuration
//!
//! # Usage
//!
//! ```bash
//! # What's in this capture?
//! gfxreplay info capture.gxtr
//!
//! # First 50 packets as JSON
//! gfxreplay dump capture.gxtr --limit 50 --json
//!
//! # Replay offscreen and stop after packet 1200
//! gfxreplay replay capture.gxtr --offscreen 1920x1080 --play-to 1200
//! ```
//!
//! Logging is controlled by `RUST_LOG` (default: `info`).

mod config;
mod dump;
mod info;
mod replay;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gfxreplay_core::plugin::{ModuleProvider, StaticModuleTable};
use tracing_subscriber::EnvFilter;

/// gfxreplay - graphics API trace replay
#[derive(Parser)]
#[command(name = "gfxreplay")]
#[command(about = "Inspect and replay graphics API traces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the trace header and a packet histogram
    Info(info::InfoArgs),

    /// List packets in capture order
    Dump(dump::DumpArgs),

    /// Replay a trace through the API replayers
    Replay(replay::ReplayArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),
}

/// Plugin modules linked into this binary
///
/// The stock build carries none; API packets are skipped unless a build
/// registers its replay modules here.
pub(crate) fn module_provider() -> Arc<dyn ModuleProvider> {
    Arc::new(StaticModuleTable::new())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info(args) => info::execute(args),
        Commands::Dump(args) => dump::execute(args),
        Commands::Replay(args) => replay::execute(args),
        Commands::Config(args) => config::execute(args),
    }
}
