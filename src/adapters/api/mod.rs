//! Inbound API Adapter
//!
//! HTTP surface of the aggregator (`/price`) plus probes and metrics.

pub mod server;

pub use server::{ApiState, PriceQuery, router, serve};
