//! Price Source Port - One External Price Feed
//!
//! Every exchange or aggregator adapter implements [`PriceSource`].
//! The aggregation core never sees endpoints, credentials or wire
//! formats; it only sees parsed prices or classified failures.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{CurrencyPair, PriceObservation, SourceFailure, SourceId};

/// Capability implemented by each price feed adapter.
///
/// Contract for implementors:
/// - never block past `deadline`
/// - map ordinary network/parse problems to a [`SourceFailure`] instead
///   of panicking (`Timeout`, `NetworkError`, `InvalidResponse`,
///   `RateLimited`, `UnsupportedPair`)
/// - report non-positive or non-finite prices as `InvalidResponse`
#[async_trait]
pub trait PriceSource: Send + Sync + 'static {
    /// Stable identifier used for ordering, priority and metrics.
    fn id(&self) -> &SourceId;

    /// Fetch the current price of `pair`, finishing before `deadline`.
    async fn fetch(
        &self,
        pair: &CurrencyPair,
        deadline: Instant,
    ) -> Result<PriceObservation, SourceFailure>;
}
