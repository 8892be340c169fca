//! Signal Gate - alert gating for token risk and liquidity signals
//!
//! Reads detector observations, decides which should become alerts and
//! prints the decisions. Delivery (toast, Telegram) is left to the consumer
//! of the output.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use signal_gate::cli::commands;
use signal_gate::config::{Config, LoggingConfig};

/// Signal Gate - decide which risk signals become alerts
#[derive(Parser)]
#[command(name = "signal-gate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "SIGNAL_GATE_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate JSONL observations from stdin and print decisions
    Run,

    /// Replay a JSONL file of timestamped observations
    Replay {
        /// Observation file
        file: PathBuf,

        /// Only print the summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Score one feature record (JSON) without touching any state
    Score {
        /// Feature record, e.g. '{"kind":"liquidity","drop_pct":60,...}'
        features: String,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Logging settings live in the config, so load it before tracing is up
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);

    let result = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Replay { file, quiet } => commands::replay(&config, &file, quiet),
        Commands::Score { features } => commands::score(&features),
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
