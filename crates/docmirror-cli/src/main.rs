//! docmirror CLI - back up document collections and recover deletions
//!
//! Every command prints a plain-text summary on stdout; logs go to stderr.

mod cli;
mod commands;
mod error;


use clap::Parser;
use docmirror_core::MirrorConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::config::run_config;
use crate::commands::list::run_list;
use crate::commands::recover::{run_recover, run_recover_all};
use crate::commands::stats::run_stats;
use crate::commands::sync::run_sync;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "docmirror=info,docmirror_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config =
        MirrorConfig::load(cli.config.as_deref())?.with_overrides(cli.db_path, cli.source_dir);

    match cli.command {
        Commands::Sync { collections } => run_sync(&config, &collections).await?,
        Commands::List { collection, json } => {
            run_list(&config, collection.as_deref(), json).await?;
        }
        Commands::Recover { collection, id } => run_recover(&config, &collection, &id).await?,
        Commands::RecoverAll { collection, json } => {
            run_recover_all(&config, &collection, json).await?;
        }
        Commands::Stats { limit, json } => run_stats(&config, limit, json).await?,
        Commands::Config => run_config(&config)?,
    }

    Ok(())
}
