//! CoinGecko REST Source - Simple Price Endpoint
//!
//! Queries `GET /api/v3/simple/price?ids={coin}&vs_currencies={vs}`,
//! which answers `{"cardano":{"usd":0.3511}}`. CoinGecko keys assets by
//! coin id rather than ticker, so base symbols are mapped through
//! `coin_ids` and quotes through `quote_aliases`.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::http::{HttpSourceClient, classify_status};
use crate::config::SourceConfig;
use crate::domain::{CurrencyPair, FailureKind, Price, PriceObservation, SourceFailure, SourceId};
use crate::ports::PriceSource;

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com";

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// `{coin_id: {vs_currency: price}}`
type SimplePrice = HashMap<String, HashMap<String, f64>>;

/// CoinGecko aggregated price source.
pub struct CoinGeckoSource {
    id: SourceId,
    base_url: String,
    /// Upper-cased base symbol to coin id.
    coin_ids: HashMap<String, String>,
    /// Upper-cased quote symbol to vs-currency.
    quote_aliases: HashMap<String, String>,
    api_key: Option<String>,
    client: HttpSourceClient,
}

impl CoinGeckoSource {
    pub fn new(
        id: SourceId,
        base_url: impl Into<String>,
        coin_ids: &HashMap<String, String>,
        quote_aliases: &HashMap<String, String>,
        client: HttpSourceClient,
    ) -> Self {
        let upper_keys = |map: &HashMap<String, String>| -> HashMap<String, String> {
            map.iter()
                .map(|(k, v)| (k.trim().to_uppercase(), v.trim().to_lowercase()))
                .collect()
        };

        Self {
            id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            coin_ids: upper_keys(coin_ids),
            quote_aliases: upper_keys(quote_aliases),
            api_key: None,
            client,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let client = HttpSourceClient::new(
            Duration::from_millis(config.timeout_ms),
            config.requests_per_minute,
        )?;
        Ok(Self::new(
            SourceId::new(config.id.as_str()),
            config.base_url.as_deref().unwrap_or(DEFAULT_COINGECKO_URL),
            &config.coin_ids,
            &config.quote_aliases,
            client,
        )
        .with_api_key(config.api_key.clone()))
    }

    fn coin_id(&self, pair: &CurrencyPair) -> Option<&str> {
        self.coin_ids.get(pair.base()).map(String::as_str)
    }

    fn vs_currency(&self, pair: &CurrencyPair) -> String {
        self.quote_aliases
            .get(pair.quote())
            .cloned()
            .unwrap_or_else(|| pair.quote().to_lowercase())
    }

    fn extract_price(
        &self,
        body: &SimplePrice,
        coin_id: &str,
        vs: &str,
    ) -> Result<Price, SourceFailure> {
        let raw = body
            .get(coin_id)
            .and_then(|quotes| quotes.get(vs))
            .ok_or_else(|| {
                SourceFailure::new(
                    self.id.clone(),
                    FailureKind::UnsupportedPair,
                    format!("no {vs} quote for {coin_id}"),
                )
            })?;

        Price::from_f64(*raw).map_err(|e| {
            SourceFailure::new(self.id.clone(), FailureKind::InvalidResponse, e.to_string())
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    #[instrument(skip(self, pair, deadline), fields(source = %self.id, pair = %pair))]
    async fn fetch(
        &self,
        pair: &CurrencyPair,
        deadline: Instant,
    ) -> Result<PriceObservation, SourceFailure> {
        let coin_id = self.coin_id(pair).ok_or_else(|| {
            SourceFailure::new(
                self.id.clone(),
                FailureKind::UnsupportedPair,
                format!("no coin id mapped for {}", pair.base()),
            )
        })?;
        let vs = self.vs_currency(pair);

        self.client.check_quota(&self.id)?;

        let started = Instant::now();
        let mut request = self
            .client
            .get(&format!("{}/api/v3/simple/price", self.base_url))
            .query(&[("ids", coin_id), ("vs_currencies", vs.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let body: SimplePrice = self
            .client
            .get_json(&self.id, request, deadline, classify_status)
            .await?;

        let price = self.extract_price(&body, coin_id, &vs)?;
        debug!(price = %price, coin_id, vs = %vs, "CoinGecko price received");

        Ok(PriceObservation::new(self.id.clone(), price, started.elapsed()))
    }
}
