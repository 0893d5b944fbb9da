//! Flowcard CLI - persistent, repo-aware knowledge card retrieval
//!
//! A command-line interface for indexing repos into knowledge cards,
//! searching them, and running the MCP server for AI assistant integration.
//!
//! # Usage
//!
//! ```bash
//! # Initialize a workspace
//! flowcard init
//!
//! # Index every registered repo
//! flowcard index
//!
//! # Search for knowledge cards
//! flowcard search "authentication flow"
//!
//! # Start the MCP server
//! flowcard mcp
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod progress;

/// Flowcard - persistent, repo-aware knowledge card retrieval
#[derive(Parser, Debug)]
#[command(name = "flowcard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace to operate on (path; defaults to the current directory)
    #[arg(long, short = 'w', global = true, env = "FLOWCARD_WORKSPACE")]
    workspace: Option<String>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Maximum hub cards to surface per search (0 suppresses hub cards)
    #[arg(long, global = true, env = "FLOWCARD_MAX_HUB_CARDS")]
    max_hub_cards: Option<u32>,
}

impl GlobalOptions {
    /// Convert global options to config overrides.
    pub fn to_config_overrides(&self) -> flowcard_config::ConfigOverrides {
        flowcard_config::ConfigOverrides {
            max_hub_cards: self.max_hub_cards,
            log_level: if self.verbose { Some("debug".to_string()) } else { None },
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a flowcard workspace
    Init(commands::init::InitArgs),

    /// Index every registered repo: parse, detect flows, generate cards and docs
    Index(commands::init::IndexArgs),

    /// Search the knowledge card index
    Search(commands::search::SearchArgs),

    /// Report changed files so stale cards/docs are invalidated
    Sync(commands::sync::SyncArgs),

    /// Manage registered repos
    #[command(subcommand)]
    Repos(commands::repos::ReposCommand),

    /// Check reindex status, or queue a reindex of stale cards
    #[command(subcommand)]
    Reindex(commands::reindex::ReindexCommand),

    /// Liveness check: store status plus card and flow counts
    Health(commands::health::HealthArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Start the MCP server for AI assistant integration
    Mcp(commands::mcp::McpArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.global.quiet {
        Level::ERROR
    } else if cli.global.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // The mcp command handles its own tracing setup (needs ansi=false for
    // JSON-RPC protocol, and must gracefully handle pre-existing subscribers).
    if !matches!(cli.command, Commands::Mcp(_)) {
        let subscriber = FmtSubscriber::builder().with_max_level(log_level).with_writer(std::io::stderr).with_ansi(true).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.global).await,
        Commands::Index(args) => commands::init::execute_index(args, cli.global).await,
        Commands::Search(args) => commands::search::execute(args, cli.global).await,
        Commands::Sync(args) => commands::sync::execute(args, cli.global).await,
        Commands::Repos(cmd) => commands::repos::execute(cmd, cli.global).await,
        Commands::Reindex(cmd) => commands::reindex::execute(cmd, cli.global).await,
        Commands::Health(args) => commands::health::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
        Commands::Mcp(args) => commands::mcp::execute(args, cli.global).await,
    }
}
