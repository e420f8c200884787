//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain logic with the `PriceSource` port to implement
//! the aggregation workflow.
//!
//! Use cases:
//! - `SourceInvoker`: one source call with timeout, retry, classification
//! - `Aggregator`: concurrent fan-out, deadline-bounded join, reduction

pub mod aggregator;
pub mod source_invoker;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use source_invoker::{RetryPolicy, SourceInvoker};
