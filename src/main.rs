//! pooled-sql - Main entry point.
//!
//! Runs one statement through a pooled connection and prints the rows as a
//! JSON array on stdout. Logs go to stderr.

use clap::Parser;
use pooled_sql::config::Config;
use pooled_sql::db::{PooledDatabase, SqlxDriver};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let credentials = config.credentials();
    let database = PooledDatabase::new(
        SqlxDriver::new(config.db_type).with_create_if_missing(config.create_if_missing),
        &credentials,
        config.pool_options(),
    )?;

    info!(
        db_type = %config.db_type,
        alias = %database.alias(),
        "Starting pooled-sql v{}",
        env!("CARGO_PKG_VERSION")
    );

    let result = database
        .query_with(&config.statement, &config.query_params())
        .await;

    // The pool is released whether or not the statement succeeded.
    if let Err(e) = database.release_pool().await {
        error!(error = %e, "Pool shutdown failed");
    }

    let rows = result?;
    info!(rows = rows.len(), "Query complete");
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
