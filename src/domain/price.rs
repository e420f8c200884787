//! Price values and successful source readings.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PriceError;

/// Identifier of a configured price source (`binance`, `coingecko`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A strictly positive decimal price.
///
/// Zero, negative and non-finite readings cannot be represented, so a
/// malformed exchange response can never leak into a consensus figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub fn new(value: Decimal) -> Result<Self, PriceError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PriceError::NonPositive(value))
        }
    }

    /// Convert a float reading (e.g. from a JSON number).
    pub fn from_f64(value: f64) -> Result<Self, PriceError> {
        if !value.is_finite() {
            return Err(PriceError::NotFinite);
        }
        let decimal = Decimal::try_from(value).map_err(|_| PriceError::NotFinite)?;
        Self::new(decimal)
    }

    pub fn value(self) -> Decimal {
        self.0
    }

    /// Relative distance `|self - reference| / reference`, saturating at
    /// `Decimal::MAX` when the ratio is too large to represent.
    pub fn relative_deviation(self, reference: Self) -> Decimal {
        // Both legs are positive, so the difference cannot overflow.
        (self.0 - reference.0)
            .abs()
            .checked_div(reference.0)
            .unwrap_or(Decimal::MAX)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// A single successful reading from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceObservation {
    pub source: SourceId,
    pub price: Price,
    pub observed_at: DateTime<Utc>,
    /// Wall time spent by the call that produced this reading.
    pub latency: Duration,
}

impl PriceObservation {
    pub fn new(source: SourceId, price: Price, latency: Duration) -> Self {
        Self {
            source,
            price,
            observed_at: Utc::now(),
            latency,
        }
    }
}
