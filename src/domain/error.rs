//! Domain error types.
//!
//! Only request validation and configuration problems are errors.
//! Per-source problems are [`SourceFailure`](super::failure::SourceFailure)
//! values and never surface through these types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Why a currency pair could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairError {
    #[error("base currency is blank")]
    BlankBase,
    #[error("quote currency is blank")]
    BlankQuote,
    #[error("base and quote are both {0}")]
    SameCurrency(String),
    #[error("cannot parse pair from {0:?}, expected BASE/QUOTE")]
    Unparseable(String),
}

/// Why a price value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price must be positive, got {0}")]
    NonPositive(Decimal),
    #[error("price is not a finite number")]
    NotFinite,
}

/// Errors that abort an aggregation call before any source is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// Malformed request (bad pair, impossible `min_sources`).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The aggregator was built from an unusable configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl From<PairError> for AggregationError {
    fn from(err: PairError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
