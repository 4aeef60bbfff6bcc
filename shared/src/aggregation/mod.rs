//! Aggregation pipeline.
//!
//! - [`service`]: the hot path applying readings to latest, hourly and daily views
//! - [`window`]: the windowed views the hot path updates
//! - [`weekly`]: folding sealed days into ISO weeks
//! - [`finalization`]: the scheduled sweep sealing aged days

pub mod finalization;
pub mod service;
pub mod weekly;
pub mod window;

pub use finalization::{FinalizationResult, FinalizationSweep};
pub use service::{AggregationService, ApplyOutcome, WindowOutcome};
pub use weekly::{RollupError, WeeklyRollup};
pub use window::{WindowAggregate, WindowGranularity};

use crate::models::{MetricAggregateError, ReadingValidationError};
use crate::resampler::ResampleError;
use crate::storage::StoreError;
use thiserror::Error;

/// Errors raised while applying a reading.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// The rain histogram cannot be resampled to a configured width.
    #[error(transparent)]
    Resample(#[from] ResampleError),

    /// A metric aggregate rejected the update.
    #[error(transparent)]
    Metric(#[from] MetricAggregateError),

    /// The store failed or a conflict outlived the retry budget.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The reading violates a structural precondition.
    #[error(transparent)]
    InvalidReading(#[from] ReadingValidationError),
}
