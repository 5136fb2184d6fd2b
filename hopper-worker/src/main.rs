//! hopper worker
//!
//! Loads configuration, prepares the schema, then processes the configured
//! queues until Ctrl-C. Jobs already claimed finish before the process exits.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hopper_core::Queue;
use hopper_db::Pool;
use hopper_postgres::PostgresDriver;

mod cli;
mod config_helpers;
mod processor;
mod tracing_setup;

use cli::CliArgs;
use config_helpers::{database_config_from_config, limiter_from_config, looper_from_config};
use processor::LogProcessor;
use tracing_setup::install_tracing_from_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = hopper_config::load_config(args.config.as_deref())
        .context("failed to load configuration")?;
    if !args.queues.is_empty() {
        config.worker.queues = args.queues;
    }
    hopper_config::validate_config(&config).context("invalid configuration")?;

    install_tracing_from_config(&config.logging);
    tracing::info!(config_path = ?args.config, queues = ?config.worker.queues, "worker starting");

    let pool = Pool::connect(&database_config_from_config(&config))
        .await
        .context("failed to connect to the database")?;

    let driver = PostgresDriver::new(pool)
        .with_looper(Box::new(looper_from_config(&config)))
        .with_limiter(limiter_from_config(&config))
        .with_batch_size(config.worker.batch_size)
        .with_chunk_size(config.worker.chunk_size);
    driver.scaffold().await.context("failed to apply migrations")?;

    let mut queues = Vec::with_capacity(config.worker.queues.len());
    for name in &config.worker.queues {
        let queue = driver
            .queue(name)
            .await
            .with_context(|| format!("failed to open queue {name}"))?;
        queue.set_processor(Arc::new(LogProcessor));
        queue.start_processing().await?;
        queues.push(queue);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested, draining in-flight jobs");

    for queue in &queues {
        queue.stop_processing().await;
    }
    driver.close().await;

    tracing::info!("worker stopped");
    Ok(())
}
