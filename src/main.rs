//! Database Backup Tool
//!
//! Dumps one MySQL or PostgreSQL database described in the shared
//! backup-database.yaml config and secures the resulting file.

// backup-database/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use config::{GlobalConfig, ORG_ENV_VAR, resolve_config_path};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info};
use utils::logging::{self, LogHandle};

#[derive(Parser)]
#[command(name = "backup-database")]
#[command(about = "Dump a MySQL or PostgreSQL database listed in the shared backup config", long_about = None)]
struct Cli {
    /// The database to dump, listed in the yaml config
    #[arg(short, long)]
    database: String,

    /// Config file to use instead of /etc/$MY_ORG/backup-database.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Main entry point for the backup tool
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env file is fine, MY_ORG usually comes from the host.
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let logging = match logging::init("info") {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("❌ Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_app(&cli, &logging).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: &Cli, logging: &LogHandle) -> Result<()> {
    let org = env::var(ORG_ENV_VAR).ok();
    let config_path = resolve_config_path(cli.config.as_deref(), org.as_deref())?;

    info!("Importing configuration from {}", config_path.display());
    let config = GlobalConfig::load(&config_path)?;

    // Each database gets its own log file.
    let log_file = config.log_file_for(&cli.database);
    info!("Now logging to {}", log_file.display());
    logging.attach_file(&log_file)?;

    let home = env::var_os("HOME").map(PathBuf::from);
    let run = backup::run_backup(&config, &config_path, &cli.database, home.as_deref())
        .await
        .with_context(|| format!("Backup of database '{}' failed", cli.database))?;
    debug!(
        "Run for '{}' started {} finished as {:?}: {}",
        run.database().id,
        run.timestamp(),
        run.outcome(),
        run.destination().display()
    );
    Ok(())
}
