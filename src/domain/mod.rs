//! Domain layer - Core value types and consensus maths.
//!
//! Pure types with no I/O (hexagonal architecture inner ring).
//! Everything here is created fresh per aggregation call and is
//! immutable once built.

pub mod consensus;
pub mod error;
pub mod failure;
pub mod pair;
pub mod price;
pub mod result;

// Re-export core types for convenience
pub use consensus::{Consensus, ConsensusStrategy, QualityScore, DEFAULT_OUTLIER_THRESHOLD};
pub use error::{AggregationError, PairError, PriceError};
pub use failure::{FailureKind, SourceFailure};
pub use pair::CurrencyPair;
pub use price::{Price, PriceObservation, SourceId};
pub use result::{AggregationOutcome, AggregationResult};
