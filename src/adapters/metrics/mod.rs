//! Metrics and Monitoring Adapters
//!
//! Provides the Prometheus metrics registry and health check state
//! (/live, /ready) served by the API router.

pub mod health;
pub mod prometheus;

pub use health::HealthState;
pub use prometheus::MetricsRegistry;
