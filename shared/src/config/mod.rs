//! Configuration for the aggregation worker.
//!
//! Configuration values are passed explicitly to the services at
//! construction; nothing here is global.

pub mod aggregation;
pub mod finalization;

pub use aggregation::AggregationConfig;
pub use finalization::FinalizationConfig;
