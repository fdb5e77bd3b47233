// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - operator CLI for the identity reconciliation subsystem.
//!
//! Opens the local store, the HTTP directory and the counter checkpoint from
//! configuration, runs one command, and shuts everything down cleanly.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use parley_config::ParleyConfig;
use parley_core::{ParleyError, StorageAdapter, SystemClock};
use parley_directory::HttpDirectory;
use parley_identity::IdentityService;
use parley_storage::{FileCheckpoint, SqliteStorage};
use tracing::{debug, error, info};

use crate::commands::Output;

/// Parley - identity reconciliation for the messaging client.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum Commands {
    /// Look up phone numbers in the directory and reconcile the answers.
    ///
    /// With no numbers, every known record with a phone number is refreshed.
    Lookup { phones: Vec<String> },
    /// Print the record holding a phone number.
    Show { phone: String },
    /// Print every known record.
    List,
    /// Issue and print the next ordering value.
    NextOrdering,
    /// Record a manually added contact.
    Observe {
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        account: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.client.log_level);

    let output = Output::new(cli.json, cli.plain);
    if let Err(e) = run(cli.command, &config, &output).await {
        eprintln!("parley: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &ParleyConfig, output: &Output) -> Result<(), ParleyError> {
    let service = open_service(config).await?;
    info!(client = %config.client.name, command = ?command, "running command");
    let result = commands::dispatch(&service, command, output).await;
    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    // Flush the counter even when the command failed.
    let closed = service.shutdown().await;
    debug!("parley shut down");
    result.and(closed)
}

/// Wire the SQLite store, HTTP directory and file checkpoint into a service.
async fn open_service(config: &ParleyConfig) -> Result<IdentityService, ParleyError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    debug!(path = %config.storage.database_path, "storage initialized");

    let directory = Arc::new(HttpDirectory::new(&config.directory)?);
    let checkpoint = Arc::new(FileCheckpoint::new(
        config.storage.resolved_checkpoint_path(),
    ));

    IdentityService::open(config, storage, directory, checkpoint, Arc::new(SystemClock)).await
}

/// Initialize the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
