//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, SourceKind, StrategyConfig};

/// Environment variable naming the config file when no CLI path is given.
pub const CONFIG_PATH_ENV: &str = "PRICE_AGGREGATOR_CONFIG";

/// Resolve the config path: first CLI argument, then
/// `PRICE_AGGREGATOR_CONFIG`, then `config.toml`.
pub fn resolve_config_path(cli_arg: Option<String>) -> String {
    cli_arg
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| "config.toml".to_string())
}

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
    let path = Path::new(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;

    info!(
        sources = config.sources.len(),
        min_sources = config.aggregation.min_sources,
        deadline_ms = config.aggregation.default_deadline_ms,
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty, unique source ids
/// - Positive timeouts and a sane backoff range
/// - `min_sources` satisfiable by the configured sources
/// - Strategy parameters that reference real sources
fn validate_config(config: &AppConfig) -> Result<()> {
    // Source validation
    anyhow::ensure!(
        !config.sources.is_empty(),
        "At least one price source must be configured"
    );

    let mut ids = HashSet::new();
    for (i, source) in config.sources.iter().enumerate() {
        anyhow::ensure!(!source.id.trim().is_empty(), "Source {i} has an empty id");
        anyhow::ensure!(
            ids.insert(source.id.as_str()),
            "Duplicate source id {}",
            source.id
        );
        anyhow::ensure!(
            source.timeout_ms > 0,
            "Source {} timeout_ms must be positive",
            source.id
        );
        anyhow::ensure!(
            source.requests_per_minute != Some(0),
            "Source {} requests_per_minute must be positive when set",
            source.id
        );
        if source.kind == SourceKind::Coingecko {
            anyhow::ensure!(
                !source.coin_ids.is_empty(),
                "CoinGecko source {} needs at least one coin_ids mapping",
                source.id
            );
        }
    }

    // Aggregation validation
    anyhow::ensure!(
        config.aggregation.default_deadline_ms > 0,
        "default_deadline_ms must be positive"
    );
    anyhow::ensure!(
        config.aggregation.min_sources >= 1
            && config.aggregation.min_sources <= config.sources.len(),
        "min_sources must be in [1, {}], got {}",
        config.sources.len(),
        config.aggregation.min_sources
    );

    match &config.aggregation.strategy {
        StrategyConfig::Median => {}
        StrategyConfig::MeanWithOutlierRejection { threshold } => {
            anyhow::ensure!(
                *threshold > 0.0 && *threshold < 1.0,
                "Outlier threshold must be in (0, 1), got {threshold}"
            );
        }
        StrategyConfig::PrimaryWithFallback { priority } => {
            anyhow::ensure!(
                !priority.is_empty(),
                "primary_with_fallback needs a non-empty priority list"
            );
            for id in priority {
                anyhow::ensure!(
                    ids.contains(id.as_str()),
                    "Priority source {id} is not configured"
                );
            }
        }
    }

    // Retry validation
    anyhow::ensure!(
        config.retry.base_backoff_ms <= config.retry.max_backoff_ms,
        "base_backoff_ms ({}) must not exceed max_backoff_ms ({})",
        config.retry.base_backoff_ms,
        config.retry.max_backoff_ms
    );
    anyhow::ensure!(
        config.retry.per_call_timeout_ms != Some(0),
        "per_call_timeout_ms must be positive when set"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::domain::{ConsensusStrategy, SourceId};

    const FULL: &str = r#"
        [service]
        name = "checkout-pricing"
        log_format = "pretty"

        [aggregation]
        default_deadline_ms = 2500
        min_sources = 2
        strategy = { kind = "primary_with_fallback", priority = ["binance", "coingecko"] }

        [retry]
        max_retries = 2
        per_call_timeout_ms = 800

        [[sources]]
        id = "binance"
        kind = "binance"

        [[sources]]
        id = "coingecko"
        kind = "coingecko"
        requests_per_minute = 30
        coin_ids = { ADA = "cardano" }
        quote_aliases = { USDT = "usd" }
    "#;

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config("nonexistent.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(FULL).unwrap();
        assert_eq!(config.service.name, "checkout-pricing");
        assert_eq!(config.service.log_format, LogFormat::Pretty);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].kind, SourceKind::Coingecko);
        assert_eq!(config.sources[1].coin_ids["ADA"], "cardano");

        let aggregator = config.aggregator_config().unwrap();
        assert_eq!(aggregator.min_sources, 2);
        assert_eq!(aggregator.retry.max_retries, 2);
        assert_eq!(
            aggregator.strategy,
            ConsensusStrategy::PrimaryWithFallback {
                priority: vec![SourceId::from("binance"), SourceId::from("coingecko")],
            }
        );
    }

    #[test]
    fn test_defaults_apply() {
        let config = parse_config(
            r#"
            [[sources]]
            id = "binance"
            kind = "binance"
            "#,
        )
        .unwrap();
        assert_eq!(config.aggregation.min_sources, 1);
        assert_eq!(config.aggregation.strategy, StrategyConfig::Median);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.sources[0].timeout_ms, 2_000);
    }

    #[test]
    fn test_outlier_threshold_defaults_to_five_percent() {
        let config = parse_config(
            r#"
            [aggregation]
            strategy = { kind = "mean_with_outlier_rejection" }

            [[sources]]
            id = "binance"
            kind = "binance"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.aggregation.strategy,
            StrategyConfig::MeanWithOutlierRejection { threshold: 0.05 }
        );
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = parse_config(
            r#"
            [[sources]]
            id = "binance"
            kind = "binance"

            [[sources]]
            id = "binance"
            kind = "binance"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unsatisfiable_min_sources() {
        let result = parse_config(
            r#"
            [aggregation]
            min_sources = 3

            [[sources]]
            id = "binance"
            kind = "binance"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_priority_source() {
        let result = parse_config(
            r#"
            [aggregation]
            strategy = { kind = "primary_with_fallback", priority = ["kraken"] }

            [[sources]]
            id = "binance"
            kind = "binance"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_config_path_prefers_cli_argument() {
        assert_eq!(
            resolve_config_path(Some("custom.toml".to_string())),
            "custom.toml"
        );
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../../config.example.toml")).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].quote_aliases["USDC"], "usd");
        assert!(config.aggregator_config().is_ok());
    }
}
