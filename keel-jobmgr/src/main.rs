//! Keel Job Manager
//!
//! Drives every job and task it owns toward its goal state.
//!
//! Architecture:
//! - Repository: PostgreSQL store for job and task runtimes
//! - Cached: per-job locked in-memory mirror of the store
//! - Goal state: job and task engines, the driver and the actions
//! - Resource manager: HTTP client used to acknowledge and kill placements
//!
//! On startup every non-terminal job is loaded from the store and enqueued.

mod api;
mod cached;
mod config;
mod db;
mod goalstate;
mod repository;
mod resmgr;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::goalstate::Driver;
use crate::repository::PgStore;
use keel_client::ResourceManagerClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_jobmgr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Keel Job Manager...");

    let config = Config::from_env().normalize();
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: resmgr_url={}, launch_timeout={:?}, job_workers={}, task_workers={}",
        config.resmgr_url,
        config.launch_timeout,
        config.job_worker_threads,
        config.task_worker_threads
    );

    info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let resmgr = Arc::new(
        ResourceManagerClient::with_timeout(config.resmgr_url.clone(), config.resmgr_timeout)
            .context("Failed to build resource manager client")?,
    );

    let driver = Driver::new(config.clone(), store.clone(), store, resmgr);
    driver.start();

    let recovered = driver
        .recover()
        .await
        .context("Failed to recover active jobs")?;
    info!("Job manager ready, {} job(s) recovered", recovered);

    let app = api::create_router(Arc::clone(&driver));

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    info!("Shutting down goal state engines...");
    driver.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
