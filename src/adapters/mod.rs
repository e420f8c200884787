//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (REST clients, the inbound HTTP server,
//! Prometheus). Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: inbound HTTP interface (`/price`, probes, metrics)
//! - `metrics`: Prometheus metrics export and health checks
//! - `sources`: Binance and CoinGecko `PriceSource` implementations

pub mod api;
pub mod metrics;
pub mod sources;
