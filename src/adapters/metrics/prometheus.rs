//! Prometheus Metrics Registry - Aggregation Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers request outcomes, per-source failures and latency, and the
//! agreement quality of each consensus.

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;

use crate::domain::AggregationResult;

/// Centralized Prometheus metrics for the aggregator.
///
/// All metrics follow the naming convention `spot_price_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Aggregation calls by pair and outcome.
    pub requests: IntCounterVec,
    /// Source failures by source and kind.
    pub source_failures: IntCounterVec,
    /// Successful source call latency (milliseconds).
    pub source_latency_ms: HistogramVec,
    /// Max relative deviation of the last consensus per pair.
    pub consensus_deviation: GaugeVec,
    /// Sources used in the last consensus per pair.
    pub agreement_count: IntGaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("spot_price_requests_total", "Aggregation requests by outcome"),
            &["pair", "outcome"],
        )?;

        let source_failures = IntCounterVec::new(
            Opts::new(
                "spot_price_source_failures_total",
                "Price source failures by kind",
            ),
            &["source", "kind"],
        )?;

        let source_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "spot_price_source_latency_ms",
                "Latency of successful source calls in milliseconds",
            )
            .buckets(vec![
                10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
            ]),
            &["source"],
        )?;

        let consensus_deviation = GaugeVec::new(
            Opts::new(
                "spot_price_consensus_deviation",
                "Largest relative deviation from the last consensus price",
            ),
            &["pair"],
        )?;

        let agreement_count = IntGaugeVec::new(
            Opts::new(
                "spot_price_agreement_count",
                "Sources used in the last consensus price",
            ),
            &["pair"],
        )?;

        // Register all metrics
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(source_failures.clone()))?;
        registry.register(Box::new(source_latency_ms.clone()))?;
        registry.register(Box::new(consensus_deviation.clone()))?;
        registry.register(Box::new(agreement_count.clone()))?;

        Ok(Self {
            registry,
            requests,
            source_failures,
            source_latency_ms,
            consensus_deviation,
            agreement_count,
        })
    }

    /// Record everything observable about one finished aggregation.
    pub fn record(&self, result: &AggregationResult) {
        let pair = result.pair.to_string();

        self.requests
            .with_label_values(&[pair.as_str(), result.outcome().as_str()])
            .inc();

        for failure in &result.failures {
            self.source_failures
                .with_label_values(&[failure.source.as_str(), failure.kind.as_str()])
                .inc();
        }

        for observation in &result.contributing_sources {
            #[allow(clippy::cast_precision_loss)]
            let millis = observation.latency.as_micros() as f64 / 1000.0;
            self.source_latency_ms
                .with_label_values(&[observation.source.as_str()])
                .observe(millis);
        }

        if result.is_success() {
            let deviation = result
                .quality
                .max_deviation_from_consensus
                .to_f64()
                .unwrap_or(f64::NAN);
            self.consensus_deviation
                .with_label_values(&[pair.as_str()])
                .set(deviation);
            self.agreement_count
                .with_label_values(&[pair.as_str()])
                .set(i64::try_from(result.quality.agreement_count).unwrap_or(i64::MAX));
        }
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
