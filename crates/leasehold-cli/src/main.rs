//! Entry point for the `leasehold` command line client.
//!
//! Connects to the configured database, runs one lock operation and prints
//! its result as JSON on stdout. Logs go to stderr.

mod cli;
mod commands;
mod config;
mod telemetry;

use std::sync::Arc;

use clap::Parser;
use leasehold_core::LockCoordinator;
use leasehold_persistence::SqlLeaseStore;
use tracing::warn;

use crate::cli::Cli;
use crate::config::Configuration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli.config, cli.database_url.clone())?;

    let subscriber =
        telemetry::get_subscriber("leasehold", &configuration.log_level(), std::io::stderr);
    telemetry::init_subscriber(subscriber)?;
    leasehold_core::metrics::describe_metrics();

    let db = configuration.database_connection().await?;
    let store = SqlLeaseStore::new(db, configuration.lease_store_config())?;
    let coordinator = LockCoordinator::new(Arc::new(store));

    let result = commands::run(&coordinator, cli.command).await;
    if let Err(e) = coordinator.close().await {
        warn!(error = %e, "Failed to close lock store");
    }

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
