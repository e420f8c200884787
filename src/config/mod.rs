//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Source endpoints, the consensus strategy and retry parameters are
//! externalized here - nothing is hardcoded in the domain layer.
//! The loaded value is converted once into an immutable
//! [`AggregatorConfig`] and never mutated afterwards.

pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{ConsensusStrategy, SourceId};
use crate::usecases::{AggregatorConfig, RetryPolicy};

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Consensus and request defaults.
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Per-source retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Price sources, queried and reported in this order.
    pub sources: Vec<SourceConfig>,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Aggregation defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Deadline applied when a request does not carry one.
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: u64,
    /// Observations required for a consensus when a request does not say.
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: default_deadline_ms(),
            min_sources: default_min_sources(),
            strategy: StrategyConfig::default(),
        }
    }
}

/// Consensus strategy selection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    Median,
    MeanWithOutlierRejection {
        /// Relative distance from the median (0.05 = 5%).
        #[serde(default = "default_outlier_threshold")]
        threshold: f64,
    },
    PrimaryWithFallback {
        /// Source ids, most authoritative first.
        priority: Vec<String>,
    },
}

/// Retry configuration shared by all sources.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Optional bound on a single attempt, inside the request deadline.
    pub per_call_timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            per_call_timeout_ms: None,
        }
    }
}

/// Supported source adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Binance,
    Coingecko,
}

/// One configured price source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique id used in results, metrics and priority lists.
    pub id: String,
    pub kind: SourceKind,
    /// Override of the adapter's public endpoint.
    pub base_url: Option<String>,
    /// HTTP request timeout, always clipped to the request deadline.
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
    /// Client-side quota; unset means unlimited.
    pub requests_per_minute: Option<u32>,
    /// Optional API key (CoinGecko demo/pro key).
    pub api_key: Option<String>,
    /// CoinGecko: base symbol to coin id (`ADA = "cardano"`).
    #[serde(default)]
    pub coin_ids: HashMap<String, String>,
    /// CoinGecko: quote symbol to vs-currency (`USDT = "usd"`).
    #[serde(default)]
    pub quote_aliases: HashMap<String, String>,
}

impl AppConfig {
    /// Build the immutable aggregator configuration.
    pub fn aggregator_config(&self) -> Result<AggregatorConfig> {
        let strategy = match &self.aggregation.strategy {
            StrategyConfig::Median => ConsensusStrategy::Median,
            StrategyConfig::MeanWithOutlierRejection { threshold } => {
                ConsensusStrategy::MeanWithOutlierRejection {
                    threshold: Decimal::try_from(*threshold)
                        .with_context(|| format!("Invalid outlier threshold {threshold}"))?,
                }
            }
            StrategyConfig::PrimaryWithFallback { priority } => {
                ConsensusStrategy::PrimaryWithFallback {
                    priority: priority.iter().map(|id| SourceId::new(id.as_str())).collect(),
                }
            }
        };

        Ok(AggregatorConfig {
            strategy,
            retry: RetryPolicy {
                max_retries: self.retry.max_retries,
                base_backoff: Duration::from_millis(self.retry.base_backoff_ms),
                max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
                per_call_timeout: self.retry.per_call_timeout_ms.map(Duration::from_millis),
            },
            min_sources: self.aggregation.min_sources,
        })
    }

    pub const fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.aggregation.default_deadline_ms)
    }
}

// Default value functions for serde

fn default_service_name() -> String {
    "spot-price-aggregator".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_deadline_ms() -> u64 {
    3_000
}

fn default_min_sources() -> usize {
    1
}

fn default_outlier_threshold() -> f64 {
    0.05
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    1_000
}

fn default_source_timeout_ms() -> u64 {
    2_000
}
