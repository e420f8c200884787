//! Currency pair value type.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::PairError;

/// What is being priced, e.g. `ADA/USDT`.
///
/// Both legs are trimmed and upper-cased on construction, so two pairs
/// compare equal regardless of how the caller spelled them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CurrencyPair {
    base: String,
    quote: String,
}

impl CurrencyPair {
    /// Build a normalized pair, rejecting blank legs and `base == quote`.
    pub fn new(base: &str, quote: &str) -> Result<Self, PairError> {
        let base = base.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();

        if base.is_empty() {
            return Err(PairError::BlankBase);
        }
        if quote.is_empty() {
            return Err(PairError::BlankQuote);
        }
        if base == quote {
            return Err(PairError::SameCurrency(base));
        }

        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Exchange-style concatenated symbol (`ADAUSDT`).
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = PairError;

    /// Accepts `BASE/QUOTE` or `BASE-QUOTE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| PairError::Unparseable(s.to_string()))?;
        Self::new(base, quote)
    }
}
