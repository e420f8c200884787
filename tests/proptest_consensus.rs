//! Property-Based Tests - Consensus Invariants
//!
//! Uses `proptest` to verify that every reducer keeps its invariants
//! across random observation sets.

use std::time::Duration;

use proptest::prelude::*;
use rust_decimal::Decimal;

use spot_price_aggregator::domain::{ConsensusStrategy, Price, PriceObservation, SourceId};

/// Prices between 0.0001 and 100000 with four decimal places.
fn observations(max_len: usize) -> impl Strategy<Value = Vec<PriceObservation>> {
    prop::collection::vec(1i64..1_000_000_000, 1..max_len).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, units)| {
                PriceObservation::new(
                    SourceId::new(format!("s{i}")),
                    Price::new(Decimal::new(units, 4)).unwrap(),
                    Duration::from_millis(1),
                )
            })
            .collect()
    })
}

/// Any positive `Decimal`, from 1e-28 up to `Decimal::MAX`.
fn extreme_observations(max_len: usize) -> impl Strategy<Value = Vec<PriceObservation>> {
    prop::collection::vec((any::<u32>(), any::<u32>(), any::<u32>(), 0u32..=28), 1..max_len)
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (lo, mid, hi, scale))| {
                    let value = Decimal::from_parts(lo.max(1), mid, hi, false, scale);
                    PriceObservation::new(
                        SourceId::new(format!("s{i}")),
                        Price::new(value).unwrap(),
                        Duration::from_millis(1),
                    )
                })
                .collect()
        })
}

fn bounds(set: &[PriceObservation]) -> (Decimal, Decimal) {
    let min = set.iter().map(|o| o.price.value()).min().unwrap();
    let max = set.iter().map(|o| o.price.value()).max().unwrap();
    (min, max)
}

proptest! {
    /// Median always lies within [min, max] of the inputs.
    #[test]
    fn median_within_input_range(set in observations(12)) {
        let consensus = ConsensusStrategy::Median.reduce(&set).unwrap();
        let (min, max) = bounds(&set);
        let price = consensus.price.value();
        prop_assert!(price >= min && price <= max, "{price} outside [{min}, {max}]");
        prop_assert_eq!(consensus.quality.agreement_count, set.len());
    }

    /// Mean after outlier rejection also lies within [min, max].
    #[test]
    fn outlier_mean_within_input_range(set in observations(12)) {
        let consensus = ConsensusStrategy::mean_with_outlier_rejection()
            .reduce(&set)
            .unwrap();
        let (min, max) = bounds(&set);
        let price = consensus.price.value();
        prop_assert!(price >= min && price <= max, "{price} outside [{min}, {max}]");
        prop_assert!(consensus.quality.agreement_count >= 1);
        prop_assert!(consensus.quality.agreement_count <= set.len());
    }

    /// Reducers do not depend on arrival order.
    #[test]
    fn reducers_ignore_input_order(set in observations(10)) {
        let mut reversed = set.clone();
        reversed.reverse();
        for strategy in [ConsensusStrategy::Median, ConsensusStrategy::mean_with_outlier_rejection()] {
            let forward = strategy.reduce(&set).unwrap();
            let backward = strategy.reduce(&reversed).unwrap();
            prop_assert_eq!(forward.price, backward.price);
            prop_assert_eq!(forward.quality, backward.quality);
        }
    }

    /// Primary-with-fallback returns exactly one input price.
    #[test]
    fn primary_returns_an_observed_price(set in observations(8), pick in 0usize..8) {
        let preferred = set[pick % set.len()].source.clone();
        let strategy = ConsensusStrategy::PrimaryWithFallback { priority: vec![preferred.clone()] };
        let consensus = strategy.reduce(&set).unwrap();
        prop_assert_eq!(consensus.used, vec![preferred]);
        prop_assert_eq!(consensus.quality.agreement_count, 1);
        prop_assert!(set.iter().any(|o| o.price == consensus.price));
    }

    /// Reported deviation really is the largest relative distance.
    #[test]
    fn max_deviation_bounds_every_observation(set in observations(10)) {
        let consensus = ConsensusStrategy::Median.reduce(&set).unwrap();
        for o in &set {
            prop_assert!(
                o.price.relative_deviation(consensus.price)
                    <= consensus.quality.max_deviation_from_consensus
            );
        }
    }

    /// Deviation is measured over the observations the mean actually used.
    #[test]
    fn outlier_mean_deviation_covers_used_sources(set in observations(10)) {
        let consensus = ConsensusStrategy::mean_with_outlier_rejection()
            .reduce(&set)
            .unwrap();
        let mut worst = Decimal::ZERO;
        for o in set.iter().filter(|o| consensus.used.contains(&o.source)) {
            worst = worst.max(o.price.relative_deviation(consensus.price));
        }
        prop_assert_eq!(worst, consensus.quality.max_deviation_from_consensus);
    }

    /// Every reducer handles the whole positive Decimal range. Bounds are
    /// not asserted here: at 28 significant digits the mean may round by
    /// one unit in the last place.
    #[test]
    fn reducers_accept_any_positive_decimal(set in extreme_observations(8)) {
        let strategies = [
            ConsensusStrategy::Median,
            ConsensusStrategy::mean_with_outlier_rejection(),
            ConsensusStrategy::PrimaryWithFallback { priority: vec![set[0].source.clone()] },
        ];
        for strategy in strategies {
            let consensus = strategy.reduce(&set).unwrap();
            prop_assert!(consensus.price.value() > Decimal::ZERO);
            prop_assert!(consensus.quality.agreement_count >= 1);
            prop_assert!(consensus.quality.max_deviation_from_consensus >= Decimal::ZERO);
        }
    }
}
