//! Spot Price Aggregator - Entry Point
//!
//! Initializes configuration, logging, price sources and the HTTP API.
//! Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging by default)
//! 3. Build price source adapters in configured order
//! 4. Build the immutable Aggregator
//! 5. Serve /price, /live, /ready, /metrics
//! 6. Wait for SIGINT → readiness off → drain → exit

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spot_price_aggregator::adapters::api::{self, ApiState};
use spot_price_aggregator::adapters::metrics::{HealthState, MetricsRegistry};
use spot_price_aggregator::adapters::sources::build_sources;
use spot_price_aggregator::config::{self, LogFormat};
use spot_price_aggregator::usecases::Aggregator;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = config::loader::resolve_config_path(std::env::args().nth(1));
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured logging ────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    match config.service.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
    }

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        sources = config.sources.len(),
        strategy = ?config.aggregation.strategy,
        "Starting spot price aggregator"
    );

    // ── 3. Price sources ────────────────────────────────────
    let sources = build_sources(&config.sources)?;

    // ── 4. Aggregator (immutable, shared by all requests) ───
    let aggregator = Aggregator::new(config.aggregator_config()?, sources)
        .context("Failed to build aggregator")?;

    // ── 5. HTTP API ─────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let health = HealthState::new();
    let state = ApiState {
        aggregator,
        metrics: Arc::new(MetricsRegistry::new()?),
        health: health.clone(),
        default_deadline: config.default_deadline(),
    };

    let bind_address = config.server.bind_address.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api::router(state), &bind_address, shutdown_rx).await {
            error!(error = %e, "Price API task failed");
        }
    });

    // ── 6. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    health.mark_shutting_down();
    let _ = shutdown_tx.send(());

    // In-flight requests are bounded by their own deadlines.
    let drain = config.default_deadline() + Duration::from_secs(5);
    if tokio::time::timeout(drain, server_handle).await.is_err() {
        error!(timeout_ms = drain.as_millis(), "Server did not drain in time");
    }

    info!("Shutdown complete");
    Ok(())
}
