//! Switchboard - console client for realtime agent sessions
//!
//! Main entry point for the Switchboard CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{agents, chat, config};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Switchboard - chat with agents over a realtime session
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Client context to use (defaults to current-context)
    #[arg(long, global = true, env = "SWITCHBOARD_CONTEXT")]
    pub context: Option<String>,

    /// Configuration directory (default: ~/.config/switchboard)
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open an interactive session with an agent
    Chat(chat::ChatArgs),

    /// List agents in the catalog
    Agents(agents::AgentsArgs),

    /// Client configuration and contexts
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "switchboard=debug,switchboard_core=debug,switchboard_ws=debug,switchboard_config=debug,info"
    } else {
        "warn"
    };

    let log_dir = cli
        .config_dir
        .as_ref()
        .map(|d| d.join("logs"))
        .unwrap_or_else(switchboard_config::log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "switchboard.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "switchboard=trace,switchboard_core=trace,switchboard_ws=trace,switchboard_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        context: cli.context,
        config_dir: cli.config_dir,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Agents(args) => agents::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
