//! Consensus strategies - reduce per-source prices into one figure.
//!
//! All strategies are pure and deterministic: the same observation set
//! always yields the same consensus, regardless of arrival order.
//!
//! Every strategy reports a [`QualityScore`]:
//! - `agreement_count`: observations used in the final figure
//! - `max_deviation_from_consensus`: largest relative distance between
//!   any of those used observations and the returned price
//!
//! Arithmetic is checked throughout: any positive `Decimal` a source can
//! report is a valid input, however extreme.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::price::{Price, PriceObservation, SourceId};

/// Default relative distance from the median beyond which an observation
/// is treated as an outlier (5%).
pub const DEFAULT_OUTLIER_THRESHOLD: Decimal = dec!(0.05);

/// How much the sources backing a consensus agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QualityScore {
    pub agreement_count: usize,
    pub max_deviation_from_consensus: Decimal,
}

/// Output of a reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    pub price: Price,
    /// Sources whose prices make up `price`, in input order.
    pub used: Vec<SourceId>,
    pub quality: QualityScore,
}

/// Reconciliation algorithm applied to the surviving observations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConsensusStrategy {
    /// Middle value; mean of the two middle values for even counts.
    #[default]
    Median,
    /// Mean of the observations within `threshold` of the median.
    /// Falls back to the median when every observation is rejected.
    MeanWithOutlierRejection { threshold: Decimal },
    /// Price of the highest-priority source that answered.
    /// Sources missing from `priority` rank after it, in input order.
    PrimaryWithFallback { priority: Vec<SourceId> },
}

impl ConsensusStrategy {
    pub const fn mean_with_outlier_rejection() -> Self {
        Self::MeanWithOutlierRejection {
            threshold: DEFAULT_OUTLIER_THRESHOLD,
        }
    }

    /// Stable label for logs, metrics and API output.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::MeanWithOutlierRejection { .. } => "mean_with_outlier_rejection",
            Self::PrimaryWithFallback { .. } => "primary_with_fallback",
        }
    }

    /// Reduce observations to a consensus. `None` only for an empty input.
    pub fn reduce(&self, observations: &[PriceObservation]) -> Option<Consensus> {
        if observations.is_empty() {
            return None;
        }

        let (price, used) = match self {
            Self::Median => {
                let price = median(observations)?;
                (price, observations.iter().collect::<Vec<_>>())
            }
            Self::MeanWithOutlierRejection { threshold } => {
                reduce_mean_without_outliers(observations, *threshold)?
            }
            Self::PrimaryWithFallback { priority } => {
                let primary = highest_priority(observations, priority)?;
                (primary.price, vec![primary])
            }
        };

        let max_deviation_from_consensus = used
            .iter()
            .map(|o| o.price.relative_deviation(price))
            .max()
            .unwrap_or_default();

        Some(Consensus {
            price,
            quality: QualityScore {
                agreement_count: used.len(),
                max_deviation_from_consensus,
            },
            used: used.into_iter().map(|o| o.source.clone()).collect(),
        })
    }
}

fn median(observations: &[PriceObservation]) -> Option<Price> {
    let mut values: Vec<Decimal> = observations.iter().map(|o| o.price.value()).collect();
    values.sort_unstable();

    let mid = values.len() / 2;
    let value = if values.len() % 2 == 0 {
        midpoint(*values.get(mid.checked_sub(1)?)?, *values.get(mid)?)
    } else {
        *values.get(mid)?
    };

    Price::new(value).ok()
}

/// `(lo + hi) / 2` for `0 < lo <= hi` without overflowing near `Decimal::MAX`.
fn midpoint(lo: Decimal, hi: Decimal) -> Decimal {
    lo.checked_add((hi - lo) / dec!(2)).unwrap_or(hi)
}

/// Arithmetic mean of positive values; `None` for an empty slice.
fn mean(values: &[Decimal]) -> Option<Decimal> {
    let count = Decimal::from(values.len());
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v));

    match sum {
        Some(sum) => sum.checked_div(count),
        // Sum exceeds Decimal::MAX: running mean over ascending values, so
        // every step is a non-negative difference of two positive prices.
        None => {
            let mut sorted = values.to_vec();
            sorted.sort_unstable();
            let mut running = Decimal::ZERO;
            for (seen, value) in (1u32..).zip(&sorted) {
                let step = (*value - running) / Decimal::from(seen);
                running = running.checked_add(step).unwrap_or(*value);
            }
            Some(running)
        }
    }
}

fn reduce_mean_without_outliers(
    observations: &[PriceObservation],
    threshold: Decimal,
) -> Option<(Price, Vec<&PriceObservation>)> {
    let median = median(observations)?;

    let kept: Vec<&PriceObservation> = observations
        .iter()
        .filter(|o| o.price.relative_deviation(median) <= threshold)
        .collect();

    if kept.is_empty() {
        // Nothing agrees with the median (only possible for wide even splits).
        return Some((median, observations.iter().collect()));
    }

    let values: Vec<Decimal> = kept.iter().map(|o| o.price.value()).collect();
    let price = Price::new(mean(&values)?).ok()?;
    Some((price, kept))
}

fn highest_priority<'a>(
    observations: &'a [PriceObservation],
    priority: &[SourceId],
) -> Option<&'a PriceObservation> {
    observations
        .iter()
        .enumerate()
        .min_by_key(|(index, o)| {
            let rank = priority
                .iter()
                .position(|id| *id == o.source)
                .unwrap_or(priority.len());
            (rank, *index)
        })
        .map(|(_, o)| o)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn obs(source: &str, price: Decimal) -> PriceObservation {
        PriceObservation::new(
            SourceId::from(source),
            Price::new(price).unwrap(),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_median_odd_count_takes_middle() {
        let set = vec![obs("a", dec!(3)), obs("b", dec!(1)), obs("c", dec!(2))];
        let consensus = ConsensusStrategy::Median.reduce(&set).unwrap();
        assert_eq!(consensus.price.value(), dec!(2));
        assert_eq!(consensus.quality.agreement_count, 3);
        assert_eq!(consensus.quality.max_deviation_from_consensus, dec!(0.5));
    }

    #[test]
    fn test_median_even_count_averages_middle_pair() {
        let set = vec![
            obs("a", dec!(10)),
            obs("b", dec!(40)),
            obs("c", dec!(20)),
            obs("d", dec!(30)),
        ];
        let consensus = ConsensusStrategy::Median.reduce(&set).unwrap();
        assert_eq!(consensus.price.value(), dec!(25));
    }

    #[test]
    fn test_empty_input_has_no_consensus() {
        assert!(ConsensusStrategy::Median.reduce(&[]).is_none());
        assert!(ConsensusStrategy::mean_with_outlier_rejection().reduce(&[]).is_none());
    }

    #[test]
    fn test_mean_rejects_outlier() {
        let set = vec![
            obs("a", dec!(100)),
            obs("b", dec!(101)),
            obs("c", dec!(99)),
            obs("d", dec!(1000)),
        ];
        let consensus = ConsensusStrategy::mean_with_outlier_rejection()
            .reduce(&set)
            .unwrap();

        assert_eq!(consensus.price.value(), dec!(100));
        assert_eq!(consensus.quality.agreement_count, 3);
        assert_eq!(
            consensus.used,
            vec![SourceId::from("a"), SourceId::from("b"), SourceId::from("c")]
        );
        // Deviation covers the three agreeing sources, not the rejected one.
        assert_eq!(consensus.quality.max_deviation_from_consensus, dec!(0.01));
    }

    #[test]
    fn test_mean_falls_back_to_median_when_all_rejected() {
        // Median is 55; both sides are ~82% away.
        let set = vec![obs("a", dec!(10)), obs("b", dec!(100))];
        let consensus = ConsensusStrategy::mean_with_outlier_rejection()
            .reduce(&set)
            .unwrap();
        assert_eq!(consensus.price.value(), dec!(55));
        assert_eq!(consensus.quality.agreement_count, 2);
    }

    #[test]
    fn test_primary_prefers_first_priority() {
        let strategy = ConsensusStrategy::PrimaryWithFallback {
            priority: vec![SourceId::from("a"), SourceId::from("b")],
        };
        let set = vec![obs("b", dec!(60)), obs("a", dec!(50))];
        let consensus = strategy.reduce(&set).unwrap();

        assert_eq!(consensus.price.value(), dec!(50));
        assert_eq!(consensus.used, vec![SourceId::from("a")]);
        assert_eq!(consensus.quality.agreement_count, 1);
        assert_eq!(consensus.quality.max_deviation_from_consensus, dec!(0));
    }

    #[test]
    fn test_primary_falls_back_when_primary_missing() {
        let strategy = ConsensusStrategy::PrimaryWithFallback {
            priority: vec![SourceId::from("a"), SourceId::from("b")],
        };
        let consensus = strategy.reduce(&[obs("b", dec!(60))]).unwrap();
        assert_eq!(consensus.price.value(), dec!(60));
    }

    #[test]
    fn test_primary_unlisted_sources_rank_last_in_input_order() {
        let strategy = ConsensusStrategy::PrimaryWithFallback {
            priority: vec![SourceId::from("a")],
        };
        let set = vec![obs("x", dec!(7)), obs("y", dec!(8))];
        assert_eq!(strategy.reduce(&set).unwrap().price.value(), dec!(7));
    }

    #[test]
    fn test_reducers_survive_extreme_ratios() {
        let tiny = Decimal::new(1, 20);
        let set = vec![obs("a", tiny), obs("b", tiny), obs("c", dec!(10_000_000_000))];

        let median = ConsensusStrategy::Median.reduce(&set).unwrap();
        assert_eq!(median.price.value(), tiny);
        assert_eq!(median.quality.max_deviation_from_consensus, Decimal::MAX);

        let mean = ConsensusStrategy::mean_with_outlier_rejection()
            .reduce(&set)
            .unwrap();
        assert_eq!(mean.price.value(), tiny);
        assert_eq!(mean.used, vec![SourceId::from("a"), SourceId::from("b")]);
        assert_eq!(mean.quality.max_deviation_from_consensus, dec!(0));
    }

    #[test]
    fn test_reducers_survive_decimal_max() {
        let set = vec![obs("a", Decimal::MAX), obs("b", Decimal::MAX)];
        for strategy in [
            ConsensusStrategy::Median,
            ConsensusStrategy::mean_with_outlier_rejection(),
        ] {
            let consensus = strategy.reduce(&set).unwrap();
            assert_eq!(consensus.price.value(), Decimal::MAX);
            assert_eq!(consensus.quality.agreement_count, 2);
        }

        let three = vec![
            obs("a", Decimal::MAX),
            obs("b", Decimal::MAX),
            obs("c", Decimal::MAX),
        ];
        let consensus = ConsensusStrategy::mean_with_outlier_rejection()
            .reduce(&three)
            .unwrap();
        assert_eq!(consensus.price.value(), Decimal::MAX);
    }

    #[test]
    fn test_midpoint_of_wide_pair() {
        let set = vec![obs("a", dec!(0.0000000001)), obs("b", Decimal::MAX)];
        let consensus = ConsensusStrategy::Median.reduce(&set).unwrap();
        assert!(consensus.price.value() > Decimal::MAX / dec!(3));
        assert!(consensus.price.value() < Decimal::MAX);
    }
}
