//! Binance REST Source - Spot Ticker Price
//!
//! Queries `GET /api/v3/ticker/price?symbol={BASE}{QUOTE}`, which
//! answers `{"symbol":"ADAUSDT","price":"0.35120000"}`. Unknown
//! symbols come back as HTTP 400 with error code -1121.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::http::{HttpSourceClient, classify_status};
use crate::config::SourceConfig;
use crate::domain::{CurrencyPair, FailureKind, Price, PriceObservation, SourceFailure, SourceId};
use crate::ports::PriceSource;

pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";

/// Binance error code for an unknown trading symbol.
const INVALID_SYMBOL: i64 = -1121;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
}

/// Binance spot price source.
pub struct BinanceSource {
    id: SourceId,
    base_url: String,
    client: HttpSourceClient,
}

impl BinanceSource {
    pub fn new(id: SourceId, base_url: impl Into<String>, client: HttpSourceClient) -> Self {
        Self {
            id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let client = HttpSourceClient::new(
            Duration::from_millis(config.timeout_ms),
            config.requests_per_minute,
        )?;
        Ok(Self::new(
            SourceId::new(config.id.as_str()),
            config.base_url.as_deref().unwrap_or(DEFAULT_BINANCE_URL),
            client,
        ))
    }

    fn parse_ticker(&self, ticker: &TickerPrice, pair: &CurrencyPair) -> Result<Price, SourceFailure> {
        if ticker.symbol != pair.symbol() {
            return Err(SourceFailure::new(
                self.id.clone(),
                FailureKind::InvalidResponse,
                format!("asked for {}, got {}", pair.symbol(), ticker.symbol),
            ));
        }

        Decimal::from_str(&ticker.price)
            .map_err(|e| e.to_string())
            .and_then(|value| Price::new(value).map_err(|e| e.to_string()))
            .map_err(|reason| {
                SourceFailure::new(
                    self.id.clone(),
                    FailureKind::InvalidResponse,
                    format!("bad price {:?}: {reason}", ticker.price),
                )
            })
    }
}

/// Binance reports unknown symbols as 400 + code -1121.
fn classify_binance_status(status: StatusCode, body: &str) -> FailureKind {
    if status == StatusCode::BAD_REQUEST {
        if let Ok(err) = serde_json::from_str::<ApiError>(body) {
            if err.code == INVALID_SYMBOL {
                return FailureKind::UnsupportedPair;
            }
        }
    }
    classify_status(status, body)
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    #[instrument(skip(self, pair, deadline), fields(source = %self.id, symbol = %pair.symbol()))]
    async fn fetch(
        &self,
        pair: &CurrencyPair,
        deadline: Instant,
    ) -> Result<PriceObservation, SourceFailure> {
        self.client.check_quota(&self.id)?;

        let started = Instant::now();
        let request = self
            .client
            .get(&format!("{}/api/v3/ticker/price", self.base_url))
            .query(&[("symbol", pair.symbol())]);

        let ticker: TickerPrice = self
            .client
            .get_json(&self.id, request, deadline, classify_binance_status)
            .await?;

        let price = self.parse_ticker(&ticker, pair)?;
        debug!(price = %price, "Binance price received");

        Ok(PriceObservation::new(self.id.clone(), price, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn source() -> BinanceSource {
        let client = HttpSourceClient::new(Duration::from_secs(1), None).unwrap();
        BinanceSource::new(SourceId::from("binance"), "http://localhost/", client)
    }

    fn ticker(symbol: &str, price: &str) -> TickerPrice {
        TickerPrice {
            symbol: symbol.to_string(),
            price: price.to_string(),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(source().base_url, "http://localhost");
    }

    #[test]
    fn test_parse_valid_ticker() {
        let pair = CurrencyPair::new("ADA", "USDT").unwrap();
        let price = source().parse_ticker(&ticker("ADAUSDT", "0.35120000"), &pair).unwrap();
        assert_eq!(price.value(), dec!(0.3512));
    }

    #[test]
    fn test_zero_and_garbage_prices_are_invalid() {
        let pair = CurrencyPair::new("ADA", "USDT").unwrap();
        for raw in ["0.00000000", "-1", "NaN", ""] {
            let failure = source().parse_ticker(&ticker("ADAUSDT", raw), &pair).unwrap_err();
            assert_eq!(failure.kind, FailureKind::InvalidResponse, "{raw}");
        }
    }

    #[test]
    fn test_symbol_mismatch_is_invalid() {
        let pair = CurrencyPair::new("ADA", "USDT").unwrap();
        let failure = source().parse_ticker(&ticker("BTCUSDT", "1"), &pair).unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidResponse);
    }

    #[test]
    fn test_invalid_symbol_code_is_unsupported_pair() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        assert_eq!(
            classify_binance_status(StatusCode::BAD_REQUEST, body),
            FailureKind::UnsupportedPair
        );
        assert_eq!(
            classify_binance_status(StatusCode::BAD_REQUEST, r#"{"code":-1100}"#),
            FailureKind::InvalidResponse
        );
        assert_eq!(
            classify_binance_status(StatusCode::TOO_MANY_REQUESTS, ""),
            FailureKind::RateLimited
        );
    }
}
