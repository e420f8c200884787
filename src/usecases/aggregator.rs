//! Aggregator - Concurrent Fan-out and Consensus
//!
//! Orchestrates one aggregation call:
//! 1. Reject malformed requests before any source is touched
//! 2. Spawn one task per configured source (via its `SourceInvoker`)
//! 3. Collect results through a single channel until every task has
//!    reported or the overall deadline fires
//! 4. On deadline, signal outstanding tasks to abandon work and mark
//!    them `Timeout` without waiting for them
//!
//! Each source call runs in its own inner task, so a panicking adapter
//! is reported as `InvalidResponse` in its slot as soon as it dies.
//! 5. Order observations/failures by configured source order and reduce
//!
//! The aggregator holds only immutable configuration behind `Arc`s and
//! is cheap to clone and safe to share across concurrent callers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, Span, debug, info, instrument, warn};
use uuid::Uuid;

use super::source_invoker::{RetryPolicy, SourceInvoker};
use crate::domain::{
    AggregationError, AggregationResult, ConsensusStrategy, CurrencyPair, FailureKind,
    PriceObservation, QualityScore, SourceFailure, SourceId,
};
use crate::ports::PriceSource;

type SourceOutcome = Result<PriceObservation, SourceFailure>;

/// Immutable aggregation settings, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub strategy: ConsensusStrategy,
    pub retry: RetryPolicy,
    /// Default for callers that do not pass their own `min_sources`.
    pub min_sources: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            strategy: ConsensusStrategy::Median,
            retry: RetryPolicy::default(),
            min_sources: 1,
        }
    }
}

/// Multi-source price aggregator.
#[derive(Clone)]
pub struct Aggregator {
    config: Arc<AggregatorConfig>,
    invokers: Arc<[SourceInvoker]>,
}

impl Aggregator {
    /// Build an aggregator over `sources`, queried in the given order.
    ///
    /// # Errors
    /// `Configuration` if the source list is empty, has duplicate ids,
    /// or cannot satisfy the default `min_sources`.
    pub fn new(
        config: AggregatorConfig,
        sources: Vec<Arc<dyn PriceSource>>,
    ) -> Result<Self, AggregationError> {
        if sources.is_empty() {
            return Err(AggregationError::Configuration(
                "at least one price source is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(sources.len());
        for source in &sources {
            if !seen.insert(source.id().clone()) {
                return Err(AggregationError::Configuration(format!(
                    "duplicate source id {}",
                    source.id()
                )));
            }
        }

        if config.min_sources == 0 || config.min_sources > sources.len() {
            return Err(AggregationError::Configuration(format!(
                "min_sources must be within 1..={}, got {}",
                sources.len(),
                config.min_sources
            )));
        }

        let invokers = sources
            .into_iter()
            .map(|source| SourceInvoker::new(source, config.retry.clone()))
            .collect();

        Ok(Self {
            config: Arc::new(config),
            invokers,
        })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Source ids in configured order.
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.invokers.iter().map(|i| i.source_id().clone()).collect()
    }

    /// Inbound entry point for raw caller input: validates the pair and
    /// turns a relative deadline into an absolute one.
    ///
    /// `min_sources = None` uses the configured default.
    pub async fn get_price_within(
        &self,
        base: &str,
        quote: &str,
        within: Duration,
        min_sources: Option<usize>,
    ) -> Result<AggregationResult, AggregationError> {
        let pair = CurrencyPair::new(base, quote)?;
        let min_sources = min_sources.unwrap_or(self.config.min_sources);
        self.get_price(&pair, Instant::now() + within, min_sources)
            .await
    }

    /// Query every source concurrently and reduce what arrives before
    /// `deadline`.
    ///
    /// Source failures never make this return `Err`; fewer than
    /// `min_sources` observations yields a result without a consensus.
    ///
    /// # Errors
    /// `InvalidRequest` if `min_sources` is zero or exceeds the number of
    /// configured sources.
    #[instrument(
        skip(self, pair, deadline),
        fields(pair = %pair, strategy = self.config.strategy.name())
    )]
    pub async fn get_price(
        &self,
        pair: &CurrencyPair,
        deadline: Instant,
        min_sources: usize,
    ) -> Result<AggregationResult, AggregationError> {
        if min_sources == 0 || min_sources > self.invokers.len() {
            return Err(AggregationError::InvalidRequest(format!(
                "min_sources must be within 1..={}, got {min_sources}",
                self.invokers.len()
            )));
        }

        let started = Instant::now();
        let (slots, deadline_hit) = self.collect(pair, deadline).await;

        let mut observations = Vec::new();
        let mut failures = Vec::new();
        for (invoker, slot) in self.invokers.iter().zip(slots) {
            match slot {
                Some(Ok(observation)) => observations.push(observation),
                Some(Err(failure)) => failures.push(failure),
                None if deadline_hit => failures.push(SourceFailure::timeout(
                    invoker.source_id().clone(),
                    "no result before the aggregation deadline",
                )),
                None => failures.push(SourceFailure::new(
                    invoker.source_id().clone(),
                    FailureKind::InvalidResponse,
                    "source task ended without reporting a result",
                )),
            }
        }

        for failure in &failures {
            warn!(source = %failure.source, kind = %failure.kind, message = %failure.message, "Source failed");
        }

        let consensus = if observations.len() >= min_sources {
            self.config.strategy.reduce(&observations)
        } else {
            None
        };

        let (consensus_price, excluded, quality) = match consensus {
            Some(consensus) => {
                let excluded = observations
                    .iter()
                    .filter(|o| !consensus.used.contains(&o.source))
                    .map(|o| o.source.clone())
                    .collect();
                info!(
                    price = %consensus.price,
                    agreement = consensus.quality.agreement_count,
                    max_deviation = %consensus.quality.max_deviation_from_consensus,
                    failures = failures.len(),
                    "Consensus reached"
                );
                (Some(consensus.price), excluded, consensus.quality)
            }
            None => {
                warn!(
                    observations = observations.len(),
                    required = min_sources,
                    failures = failures.len(),
                    "Insufficient sources for consensus"
                );
                (None, Vec::new(), QualityScore::default())
            }
        };

        Ok(AggregationResult {
            request_id: Uuid::new_v4(),
            pair: pair.clone(),
            strategy: self.config.strategy.name(),
            consensus_price,
            contributing_sources: observations,
            excluded,
            failures,
            quality,
            min_sources,
            completed_at: Utc::now(),
            elapsed: started.elapsed(),
        })
    }

    /// Fan out to every invoker and gather outcomes by source index.
    ///
    /// Returns the per-source slots plus whether the deadline cut the
    /// wait short. Tasks still running at the deadline receive a
    /// cancellation signal and are left to wind down on their own; a
    /// late result is dropped along with the receiver.
    async fn collect(
        &self,
        pair: &CurrencyPair,
        deadline: Instant,
    ) -> (Vec<Option<SourceOutcome>>, bool) {
        let count = self.invokers.len();
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, SourceOutcome)>(count);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        for (index, invoker) in self.invokers.iter().enumerate() {
            let invoker = invoker.clone();
            let pair = pair.clone();
            let result_tx = result_tx.clone();
            let mut cancel_rx = cancel_rx.clone();

            tokio::spawn(
                async move {
                    let source = invoker.source_id().clone();
                    let mut call = tokio::spawn(
                        async move { invoker.invoke(&pair, deadline).await }
                            .instrument(Span::current()),
                    );

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel_rx.changed() => {
                            call.abort();
                            return;
                        }
                        joined = &mut call => joined.unwrap_or_else(|err| {
                            let message = if err.is_panic() {
                                "source panicked while fetching"
                            } else {
                                "source call was cancelled"
                            };
                            Err(SourceFailure::new(
                                source.clone(),
                                FailureKind::InvalidResponse,
                                message,
                            ))
                        }),
                    };

                    if result_tx.send((index, outcome)).await.is_err() {
                        debug!(source = %source, "Aggregation no longer collecting, result dropped");
                    }
                }
                .instrument(Span::current()),
            );
        }
        drop(result_tx);

        let mut slots: Vec<Option<SourceOutcome>> = vec![None; count];
        let mut settled = 0;
        while settled < count {
            match timeout_at(deadline, result_rx.recv()).await {
                Ok(Some((index, outcome))) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                        settled += 1;
                    }
                }
                // Every sender dropped: remaining tasks died without reporting.
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = count - settled,
                        "Aggregation deadline reached, abandoning outstanding sources"
                    );
                    cancel_tx.send_replace(true);
                    return (slots, true);
                }
            }
        }

        (slots, false)
    }
}
