//! Online metric accumulator with a one-way sealing transition.
//!
//! A `MetricAggregate` is either *active* (running sum, count, min and max)
//! or *finalized* (min, max and a precomputed average). Finalized aggregates
//! never accept new values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by [`MetricAggregate`] state transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricAggregateError {
    /// The aggregate has already been sealed.
    #[error("Metric aggregate is already finalized")]
    AlreadyFinalized,

    /// The aggregate holds no values to average.
    #[error("Metric aggregate is empty")]
    EmptyAggregate,

    /// Min is greater than max.
    #[error("Invalid metric range: min {min} is greater than max {max}")]
    InvalidRange {
        /// Offending minimum.
        min: f64,
        /// Offending maximum.
        max: f64,
    },

    /// A stored document populates neither or both of `{sum, count}` and `avg`.
    #[error("Malformed metric aggregate document: {0}")]
    Malformed(&'static str),
}

/// A compact `{min, max, avg}` summary of a sealed metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
    /// Arithmetic mean.
    pub avg: f64,
}

impl StatSummary {
    /// Creates a new summary.
    #[must_use]
    pub const fn new(min: f64, max: f64, avg: f64) -> Self {
        Self { min, max, avg }
    }

    /// The measured-zero summary (`{0, 0, 0}`).
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Running statistics for one metric over one time window.
///
/// # Example
///
/// ```
/// use shared::models::MetricAggregate;
///
/// let mut agg = MetricAggregate::new(20.0);
/// agg.increment(22.0).unwrap();
/// agg.finalize().unwrap();
///
/// assert!(agg.is_finalized());
/// assert_eq!(agg.average().unwrap(), 21.0);
/// assert!(agg.increment(23.0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricAggregateDocument", into = "MetricAggregateDocument")]
pub enum MetricAggregate {
    /// Still accumulating.
    Active {
        /// Sum of all values.
        sum: f64,
        /// Number of values, always greater than zero.
        count: u64,
        /// Smallest value.
        min: f64,
        /// Largest value.
        max: f64,
    },
    /// Sealed.
    Finalized {
        /// Average computed at sealing time.
        avg: f64,
        /// Smallest value.
        min: f64,
        /// Largest value.
        max: f64,
    },
}

impl MetricAggregate {
    /// Creates an active aggregate holding a single value.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self::Active {
            sum: value,
            count: 1,
            min: value,
            max: value,
        }
    }

    /// Rebuilds an active aggregate from stored parts.
    ///
    /// # Errors
    ///
    /// Returns `EmptyAggregate` if `count` is zero and `InvalidRange` if
    /// `min > max`.
    pub fn active(sum: f64, count: u64, min: f64, max: f64) -> Result<Self, MetricAggregateError> {
        if count == 0 {
            return Err(MetricAggregateError::EmptyAggregate);
        }
        check_range(min, max)?;
        Ok(Self::Active {
            sum,
            count,
            min,
            max,
        })
    }

    /// Rebuilds a sealed aggregate from its `{min, max, avg}` summary.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if `min > max`.
    pub fn finalized(min: f64, max: f64, avg: f64) -> Result<Self, MetricAggregateError> {
        check_range(min, max)?;
        Ok(Self::Finalized { avg, min, max })
    }

    /// Folds a new value into the aggregate.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyFinalized` if the aggregate is sealed.
    pub fn increment(&mut self, value: f64) -> Result<(), MetricAggregateError> {
        match self {
            Self::Active {
                sum,
                count,
                min,
                max,
            } => {
                *sum += value;
                *count += 1;
                *min = min.min(value);
                *max = max.max(value);
                Ok(())
            }
            Self::Finalized { .. } => Err(MetricAggregateError::AlreadyFinalized),
        }
    }

    /// Returns the average value.
    ///
    /// # Errors
    ///
    /// Returns `EmptyAggregate` if an active aggregate has a zero count.
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Result<f64, MetricAggregateError> {
        match *self {
            Self::Finalized { avg, .. } => Ok(avg),
            Self::Active { count: 0, .. } => Err(MetricAggregateError::EmptyAggregate),
            Self::Active { sum, count, .. } => Ok(sum / count as f64),
        }
    }

    /// Seals the aggregate: computes the average and drops sum and count.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyFinalized` if called on a sealed aggregate and
    /// `EmptyAggregate` if there is nothing to average.
    pub fn finalize(&mut self) -> Result<(), MetricAggregateError> {
        match *self {
            Self::Finalized { .. } => Err(MetricAggregateError::AlreadyFinalized),
            Self::Active { min, max, .. } => {
                let avg = self.average()?;
                *self = Self::Finalized { avg, min, max };
                Ok(())
            }
        }
    }

    /// Returns true once the aggregate is sealed.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }

    /// Smallest value seen.
    #[must_use]
    pub const fn min(&self) -> f64 {
        match *self {
            Self::Active { min, .. } | Self::Finalized { min, .. } => min,
        }
    }

    /// Largest value seen.
    #[must_use]
    pub const fn max(&self) -> f64 {
        match *self {
            Self::Active { max, .. } | Self::Finalized { max, .. } => max,
        }
    }

    /// Number of folded values, `None` once sealed.
    #[must_use]
    pub const fn count(&self) -> Option<u64> {
        match *self {
            Self::Active { count, .. } => Some(count),
            Self::Finalized { .. } => None,
        }
    }

    /// Returns the `{min, max, avg}` summary.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricAggregate::average`] errors.
    pub fn summary(&self) -> Result<StatSummary, MetricAggregateError> {
        Ok(StatSummary::new(self.min(), self.max(), self.average()?))
    }
}

fn check_range(min: f64, max: f64) -> Result<(), MetricAggregateError> {
    if min > max {
        return Err(MetricAggregateError::InvalidRange { min, max });
    }
    Ok(())
}

/// Storage shape of a [`MetricAggregate`].
///
/// Exactly one of `{sum, count}` or `avg` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAggregateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    min: f64,
    max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avg: Option<f64>,
}

impl TryFrom<MetricAggregateDocument> for MetricAggregate {
    type Error = MetricAggregateError;

    fn try_from(doc: MetricAggregateDocument) -> Result<Self, Self::Error> {
        match (doc.sum, doc.count, doc.avg) {
            (Some(sum), Some(count), None) => Self::active(sum, count, doc.min, doc.max),
            (None, None, Some(avg)) => Self::finalized(doc.min, doc.max, avg),
            (_, _, Some(_)) => Err(MetricAggregateError::Malformed(
                "avg populated alongside sum/count",
            )),
            _ => Err(MetricAggregateError::Malformed("missing sum/count or avg")),
        }
    }
}

impl From<MetricAggregate> for MetricAggregateDocument {
    fn from(agg: MetricAggregate) -> Self {
        match agg {
            MetricAggregate::Active {
                sum,
                count,
                min,
                max,
            } => Self {
                sum: Some(sum),
                count: Some(count),
                min,
                max,
                avg: None,
            },
            MetricAggregate::Finalized { avg, min, max } => Self {
                sum: None,
                count: None,
                min,
                max,
                avg: Some(avg),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_active_with_single_value() {
        let agg = MetricAggregate::new(12.5);
        assert!(!agg.is_finalized());
        assert_eq!(agg.count(), Some(1));
        assert_eq!(agg.min(), 12.5);
        assert_eq!(agg.max(), 12.5);
        assert_eq!(agg.average().unwrap(), 12.5);
    }

    #[test]
    fn test_increment_tracks_min_max_sum() {
        let mut agg = MetricAggregate::new(10.0);
        agg.increment(4.0).unwrap();
        agg.increment(16.0).unwrap();

        assert_eq!(agg.count(), Some(3));
        assert_eq!(agg.min(), 4.0);
        assert_eq!(agg.max(), 16.0);
        assert_eq!(agg.average().unwrap(), 10.0);
    }

    #[test]
    fn test_finalize_computes_average_and_drops_count() {
        let mut agg = MetricAggregate::new(1.0);
        agg.increment(2.0).unwrap();
        agg.finalize().unwrap();

        assert!(agg.is_finalized());
        assert_eq!(agg.count(), None);
        assert_eq!(agg, MetricAggregate::Finalized { avg: 1.5, min: 1.0, max: 2.0 });
    }

    #[test]
    fn test_finalize_twice_fails() {
        let mut agg = MetricAggregate::new(1.0);
        agg.finalize().unwrap();
        assert_eq!(agg.finalize(), Err(MetricAggregateError::AlreadyFinalized));
    }

    #[test]
    fn test_increment_after_finalize_fails() {
        let mut agg = MetricAggregate::new(1.0);
        agg.finalize().unwrap();
        assert_eq!(agg.increment(5.0), Err(MetricAggregateError::AlreadyFinalized));
        assert_eq!(agg.max(), 1.0);
    }

    #[test]
    fn test_finalized_constructor_rejects_inverted_range() {
        let result = MetricAggregate::finalized(5.0, 1.0, 3.0);
        assert!(matches!(result, Err(MetricAggregateError::InvalidRange { .. })));
    }

    #[test]
    fn test_active_constructor_rejects_zero_count() {
        let result = MetricAggregate::active(0.0, 0, 0.0, 0.0);
        assert_eq!(result, Err(MetricAggregateError::EmptyAggregate));
    }

    #[test]
    fn test_summary_of_finalized() {
        let agg = MetricAggregate::finalized(1.0, 9.0, 4.0).unwrap();
        assert_eq!(agg.summary().unwrap(), StatSummary::new(1.0, 9.0, 4.0));
    }

    #[test]
    fn test_document_shape_for_each_state() {
        let active = serde_json::to_value(MetricAggregate::new(3.0)).unwrap();
        assert_eq!(active["sum"], 3.0);
        assert_eq!(active["count"], 1);
        assert!(active.get("avg").is_none());

        let sealed =
            serde_json::to_value(MetricAggregate::finalized(1.0, 2.0, 1.5).unwrap()).unwrap();
        assert_eq!(sealed["avg"], 1.5);
        assert!(sealed.get("sum").is_none());
        assert!(sealed.get("count").is_none());
    }

    #[test]
    fn test_document_with_both_states_is_rejected() {
        let json = r#"{"sum": 3.0, "count": 1, "min": 3.0, "max": 3.0, "avg": 3.0}"#;
        let result: Result<MetricAggregate, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_document_loads_finalized() {
        let json = r#"{"min": 1.0, "max": 4.0, "avg": 2.0}"#;
        let agg: MetricAggregate = serde_json::from_str(json).unwrap();
        assert!(agg.is_finalized());
        assert_eq!(agg.average().unwrap(), 2.0);
    }
}
