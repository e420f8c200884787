//! Aggregation output value object.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::consensus::QualityScore;
use super::failure::SourceFailure;
use super::pair::CurrencyPair;
use super::price::{Price, PriceObservation, SourceId};

/// Terminal state of one aggregation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationOutcome {
    Consensus,
    /// Fewer than `min_sources` observations succeeded.
    InsufficientSources,
}

impl AggregationOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Consensus => "consensus",
            Self::InsufficientSources => "insufficient_sources",
        }
    }
}

/// Result of one `get_price` call.
///
/// `consensus_price` is present iff at least `min_sources` observations
/// succeeded. Observations and failures are ordered by configured source
/// order, never by completion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    pub request_id: Uuid,
    pub pair: CurrencyPair,
    pub strategy: &'static str,
    pub consensus_price: Option<Price>,
    pub contributing_sources: Vec<PriceObservation>,
    /// Observations that answered but were left out of the final figure.
    pub excluded: Vec<SourceId>,
    pub failures: Vec<SourceFailure>,
    pub quality: QualityScore,
    pub min_sources: usize,
    pub completed_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl AggregationResult {
    pub const fn is_success(&self) -> bool {
        self.consensus_price.is_some()
    }

    pub const fn outcome(&self) -> AggregationOutcome {
        if self.is_success() {
            AggregationOutcome::Consensus
        } else {
            AggregationOutcome::InsufficientSources
        }
    }

    /// True when a consensus exists and no observation strays further
    /// than `threshold` (relative) from it.
    pub fn within_deviation(&self, threshold: Decimal) -> bool {
        self.is_success() && self.quality.max_deviation_from_consensus <= threshold
    }
}
