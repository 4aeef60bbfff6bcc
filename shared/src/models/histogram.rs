//! Rain histogram value types.
//!
//! A [`RainHistogram`] is the sparse, fixed-interval unit-count histogram a
//! device reports (e.g. rain-gauge tips per slot). A [`Histogram`] is the dense
//! rainfall histogram stored on aggregates after resampling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// How resampled buckets are folded into an existing histogram slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Accumulate across readings (hourly/daily rollups).
    Sum,
    /// Keep the largest value seen (rolling latest snapshot).
    Max,
}

impl MergeMode {
    /// Folds `incoming` into `current`.
    #[must_use]
    pub fn apply(self, current: f64, incoming: f64) -> f64 {
        match self {
            Self::Sum => current + incoming,
            Self::Max => current.max(incoming),
        }
    }
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// Sparse unit-count histogram as reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RainHistogram {
    /// Slot index to unit count. Missing slots are zero.
    #[serde(default)]
    pub unit_counts: BTreeMap<u32, u32>,

    /// Width of one slot in seconds.
    #[validate(range(min = 1, message = "Histogram interval must be positive"))]
    pub interval_seconds: u32,

    /// Start of slot 0.
    pub start_time: DateTime<Utc>,

    /// Declared number of slots; defaults to the highest populated index + 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_count: Option<u32>,

    /// Millimetres of rain per unit (tip).
    #[validate(range(min = 0.0, message = "Value per unit cannot be negative"))]
    pub value_per_unit: f64,
}

impl RainHistogram {
    /// Creates a histogram from dense per-slot counts.
    #[must_use]
    pub fn from_counts(
        counts: &[u32],
        interval_seconds: u32,
        start_time: DateTime<Utc>,
        value_per_unit: f64,
    ) -> Self {
        let unit_counts = counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .filter_map(|(i, c)| u32::try_from(i).ok().map(|i| (i, *c)))
            .collect();

        Self {
            unit_counts,
            interval_seconds,
            start_time,
            slot_count: u32::try_from(counts.len()).ok(),
            value_per_unit,
        }
    }

    /// Number of slots covered by this histogram.
    #[must_use]
    pub fn slot_count(&self) -> u32 {
        self.slot_count.unwrap_or_else(|| {
            self.unit_counts
                .keys()
                .next_back()
                .map_or(0, |last| last + 1)
        })
    }

    /// Sum of all unit counts.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.unit_counts.values().map(|c| u64::from(*c)).sum()
    }
}

/// Dense rainfall histogram (values in mm) attached to an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Per-slot values.
    pub values: Vec<f64>,
    /// Width of one slot in seconds.
    pub interval_seconds: u32,
    /// Start of slot 0.
    pub start_time: DateTime<Utc>,
}

impl Histogram {
    /// Creates a zero-filled histogram.
    #[must_use]
    pub fn empty(start_time: DateTime<Utc>, interval_seconds: u32, slot_count: usize) -> Self {
        Self {
            values: vec![0.0; slot_count],
            interval_seconds,
            start_time,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.values.len()
    }

    /// Sum over all slots.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// `(min, max, mean)` over the slots that recorded rain, `None` if every
    /// slot is dry.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> Option<(f64, f64, f64)> {
        let wet: Vec<f64> = self.values.iter().copied().filter(|v| *v > 0.0).collect();
        if wet.is_empty() {
            return None;
        }
        let min = wet.iter().copied().fold(f64::INFINITY, f64::min);
        let max = wet.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = wet.iter().sum::<f64>() / wet.len() as f64;
        Some((min, max, avg))
    }
}
