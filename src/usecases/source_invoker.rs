//! Source Invoker - Timeout, Retry and Classification for One Source
//!
//! Wraps a single [`PriceSource`] call with:
//! - a deadline check before any network work
//! - an optional per-attempt timeout inside the overall deadline
//! - bounded exponential-backoff retries for transient failures only
//!
//! Invocations share no mutable state; one invoker can serve any number
//! of concurrent aggregation calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, instrument};

use crate::domain::{CurrencyPair, PriceObservation, SourceFailure, SourceId};
use crate::ports::PriceSource;

/// Retry and timeout parameters applied to every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first for `NetworkError` / `RateLimited`.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry.
    pub base_backoff: Duration,
    /// Upper bound on a single backoff delay.
    pub max_backoff: Duration,
    /// Per-attempt bound, always clipped to the overall deadline.
    pub per_call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            per_call_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Calls one price source under a [`RetryPolicy`]. Never panics, never
/// returns anything but an observation or a classified failure.
#[derive(Clone)]
pub struct SourceInvoker {
    source: Arc<dyn PriceSource>,
    policy: RetryPolicy,
}

impl SourceInvoker {
    pub fn new(source: Arc<dyn PriceSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn source_id(&self) -> &SourceId {
        self.source.id()
    }

    /// Fetch `pair` from the wrapped source, retrying transient failures
    /// while the deadline allows it.
    #[instrument(skip(self, pair), fields(source = %self.source.id(), pair = %pair))]
    pub async fn invoke(
        &self,
        pair: &CurrencyPair,
        deadline: Instant,
    ) -> Result<PriceObservation, SourceFailure> {
        let id = self.source.id();
        let mut retries = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(SourceFailure::timeout(
                    id.clone(),
                    "deadline elapsed before the source was called",
                ));
            }

            let attempt_deadline = self
                .policy
                .per_call_timeout
                .map_or(deadline, |limit| deadline.min(now + limit));

            let attempt = self.source.fetch(pair, attempt_deadline);
            let failure = match timeout_at(attempt_deadline, attempt).await {
                Ok(Ok(observation)) => return Ok(observation),
                Ok(Err(failure)) => failure,
                Err(_) => SourceFailure::timeout(
                    id.clone(),
                    format!(
                        "no response within {}ms",
                        attempt_deadline.saturating_duration_since(now).as_millis()
                    ),
                ),
            };

            if !failure.kind.is_transient() || retries >= self.policy.max_retries {
                return Err(failure);
            }

            retries += 1;
            let delay = self.policy.backoff(retries);
            if Instant::now() + delay >= deadline {
                debug!(
                    kind = %failure.kind,
                    delay_ms = delay.as_millis(),
                    "Backoff exceeds remaining budget, giving up"
                );
                return Err(failure);
            }

            debug!(
                retry = retries,
                kind = %failure.kind,
                delay_ms = delay.as_millis(),
                "Retrying source"
            );
            sleep(delay).await;
        }
    }
}
