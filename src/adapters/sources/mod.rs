//! Price Source Adapters - REST Exchange and Aggregator Clients
//!
//! Provides `PriceSource` implementations for:
//! - Binance: spot ticker price per trading symbol
//! - CoinGecko: aggregated market price per coin id
//!
//! Both share `HttpSourceClient` for deadlines, quotas and
//! failure classification.

pub mod binance;
pub mod coingecko;
pub mod http;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub use binance::BinanceSource;
pub use coingecko::CoinGeckoSource;
pub use http::HttpSourceClient;

use crate::config::{SourceConfig, SourceKind};
use crate::ports::PriceSource;

/// Build adapters for every configured source, preserving config order.
pub fn build_sources(configs: &[SourceConfig]) -> Result<Vec<Arc<dyn PriceSource>>> {
    configs
        .iter()
        .map(|config| {
            let source: Arc<dyn PriceSource> = match config.kind {
                SourceKind::Binance => Arc::new(BinanceSource::from_config(config)?),
                SourceKind::Coingecko => Arc::new(CoinGeckoSource::from_config(config)?),
            };
            info!(
                source = %config.id,
                kind = ?config.kind,
                rate_limit = ?config.requests_per_minute,
                "Price source configured"
            );
            Ok(source)
        })
        .collect::<Result<Vec<_>>>()
        .context("Failed to build price sources")
}
