//! Pumpwatch - bonding-curve token sniper and trade scanner
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Most freshly listed tokens go to zero (rug pulls, abandonment).
//! - A paper-trading dry run is NOT evidence the strategy is profitable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, warn};

// Use the library crate
use pumpwatch::cli::commands;
use pumpwatch::config::Config;

/// Bonding-curve token sniper and trade scanner
#[derive(Parser)]
#[command(name = "pumpwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sniper
    Snipe {
        /// Run in dry-run mode (paper trading, no real orders)
        #[arg(long)]
        dry_run: bool,
    },

    /// Watch the full trade feed and alert on matching trades
    Scan,

    /// Close empty token accounts, reclaiming rent
    Close {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,

        /// Simulate only, don't execute
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pumpwatch=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if config.exchange.api_key.is_empty() {
        warn!("No trade API key configured; live trading is unavailable");
    }

    let result = match cli.command {
        Commands::Snipe { dry_run } => commands::snipe(&config, dry_run).await,
        Commands::Scan => commands::scan(&config).await,
        Commands::Close { force, dry_run } => commands::close(&config, force, dry_run).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
