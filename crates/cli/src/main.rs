//! Chain capacity CLI
//!
//! Validates capacity configuration and runs one-off capacity estimates,
//! either from a frozen snapshot file or live against the cluster.

mod commands;
mod output;

use anyhow::{Context, Result};
use capacity_lib::CapacityConfig;
use clap::{Parser, Subcommand};
use commands::{check, estimate, live};
use std::path::PathBuf;

/// Chain capacity CLI
#[derive(Parser)]
#[command(name = "capctl")]
#[command(author, version, about = "CLI for the chain capacity estimator", long_about = None)]
pub struct Cli {
    /// Capacity configuration file (can also be set via CAPACITY_CONFIG env var)
    #[arg(long, short, env = "CAPACITY_CONFIG", default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration and show every dependency chain
    Check,

    /// Run one cycle over a frozen snapshot file
    Estimate {
        /// JSON snapshot, as written by `live --dump-snapshot`
        #[arg(long, short)]
        snapshot: PathBuf,
    },

    /// Collect a snapshot from the cluster and run one cycle
    Live {
        /// Save the collected snapshot for later `estimate` runs
        #[arg(long)]
        dump_snapshot: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = CapacityConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Check => check::check_config(&config, cli.format)?,
        Commands::Estimate { snapshot } => {
            estimate::estimate_from_file(&config, &snapshot, cli.format)?;
        }
        Commands::Live { dump_snapshot } => {
            live::estimate_live(&config, dump_snapshot.as_deref(), cli.format).await?;
        }
    }

    Ok(())
}
