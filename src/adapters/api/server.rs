//! Price API Server - Inbound HTTP Interface
//!
//! Exposes the aggregator over HTTP via axum 0.7:
//! - `GET /price?base=ADA&quote=USDT&deadline_ms=2000&min_sources=1`
//! - `GET /live`, `GET /ready` (health probes)
//! - `GET /metrics` (Prometheus text format)
//!
//! `/price` answers 200 with a consensus, 503 (same body) when too few
//! sources answered, and 400 for malformed requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{FromRef, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::adapters::metrics::{HealthState, MetricsRegistry, health};
use crate::usecases::Aggregator;

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Aggregator,
    pub metrics: Arc<MetricsRegistry>,
    pub health: HealthState,
    /// Deadline used when a request omits `deadline_ms`.
    pub default_deadline: Duration,
}

impl FromRef<ApiState> for HealthState {
    fn from_ref(state: &ApiState) -> Self {
        state.health.clone()
    }
}

/// Query string of `GET /price`.
#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub base: String,
    pub quote: String,
    pub deadline_ms: Option<u64>,
    pub min_sources: Option<usize>,
}

/// Build the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/price", get(get_price))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve `router` on `bind_address` until the shutdown signal fires.
#[instrument(skip(router, shutdown_rx))]
pub async fn serve(
    router: Router,
    bind_address: &str,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    info!(address = %bind_address, "Price API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .context("Price API server failed")?;

    Ok(())
}

async fn get_price(State(state): State<ApiState>, Query(query): Query<PriceQuery>) -> Response {
    let within = query
        .deadline_ms
        .map_or(state.default_deadline, Duration::from_millis);

    match state
        .aggregator
        .get_price_within(&query.base, &query.quote, within, query.min_sources)
        .await
    {
        Ok(result) => {
            state.metrics.record(&result);
            let status = if result.is_success() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(result)).into_response()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn metrics(State(state): State<ApiState>) -> Response {
    match state.metrics.render() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
