//! # tally-sync
//!
//! Command-line runner for tally-sync.
//!
//! ## Commands
//!
//! - `validate`: Load settings and plugin config and print the rule table
//! - `check`: Validate, then probe every collection for read access
//! - `run`: Run a full sync pass
//!
//! ## Example
//!
//! ```bash
//! # Check the configuration offline
//! tally-sync --settings tally-sync.toml validate
//!
//! # Make sure the token can read every collection
//! tally-sync check
//!
//! # Sync (Ctrl-C stops at the next checkpoint, exit status 2)
//! RUST_LOG=tally_sync_client=debug tally-sync run
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod settings;

use commands::{check, run, validate};
use settings::Settings;

/// Command-line runner for tally-sync.
#[derive(Parser, Debug)]
#[command(name = "tally-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = "tally-sync.toml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate settings and plugin config (no network)
    Validate,

    /// Validate, then probe every collection for read access
    Check,

    /// Run a full sync pass
    Run,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let settings = Settings::from_file(&cli.settings)?;

    match cli.command {
        Commands::Validate => {
            validate::run(&settings)?;
        }
        Commands::Check => {
            check::run(&settings).await?;
        }
        Commands::Run => {
            return run::run(&settings).await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
