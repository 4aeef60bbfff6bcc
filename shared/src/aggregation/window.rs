//! Hourly and daily windows updated by the hot path.

use crate::config::AggregationConfig;
use crate::models::{
    increment_or_insert, DailyAggregate, Histogram, HourlyAggregate, MetricAggregate,
    MetricAggregateError, Reading, VersionToken, View,
};
use crate::resampler::{merge, Buckets, ResampleError};
use crate::view_id::ViewId;
use chrono::{DateTime, DurationRound, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Window size of a hot-path aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowGranularity {
    /// One UTC hour.
    Hourly,
    /// One UTC day.
    Daily,
}

impl WindowGranularity {
    /// Rain bucket width used for this window.
    #[must_use]
    pub const fn bucket_seconds(self, config: &AggregationConfig) -> u32 {
        match self {
            Self::Hourly => config.hourly_bucket_seconds,
            Self::Daily => config.daily_bucket_seconds,
        }
    }

    /// Start of the window containing `ts`.
    ///
    /// # Errors
    ///
    /// Returns `TimestampOutOfRange` if `ts` cannot be truncated.
    pub fn window_start(self, ts: DateTime<Utc>) -> Result<DateTime<Utc>, ResampleError> {
        let width = match self {
            Self::Hourly => TimeDelta::hours(1),
            Self::Daily => TimeDelta::days(1),
        };
        ts.duration_trunc(width)
            .map_err(|_| ResampleError::TimestampOutOfRange)
    }

    /// Storage key of the window starting at `start`.
    #[must_use]
    pub fn key(self, device_id: &str, start: DateTime<Utc>) -> String {
        match self {
            Self::Hourly => ViewId::hourly(device_id, &start).key,
            Self::Daily => ViewId::daily(device_id, &start).key,
        }
    }
}

impl std::fmt::Display for WindowGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

/// A view the hot path folds readings into.
pub trait WindowAggregate: View {
    /// Window size of this view.
    const GRANULARITY: WindowGranularity;

    /// Creates an empty window.
    fn create(device_id: &str, start: DateTime<Utc>) -> Self;

    /// Returns true once the window is sealed.
    fn is_finalized(&self) -> bool;

    /// Version attached by the store.
    fn version(&self) -> Option<&VersionToken>;

    /// Returns true if `source_id` was already folded in.
    fn has_applied(&self, source_id: &str) -> bool;

    /// Folds one reading in and records its source id.
    ///
    /// Rain buckets outside the window are clipped. Metric values are only
    /// folded into the window containing the reading timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric aggregate is already sealed.
    fn apply(
        &mut self,
        reading: &Reading,
        source_id: &str,
        rain: Option<&Buckets>,
        config: &AggregationConfig,
    ) -> Result<(), MetricAggregateError>;
}

impl WindowAggregate for HourlyAggregate {
    const GRANULARITY: WindowGranularity = WindowGranularity::Hourly;

    fn create(device_id: &str, start: DateTime<Utc>) -> Self {
        Self::new(device_id, start)
    }

    fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    fn version(&self) -> Option<&VersionToken> {
        self.version.as_ref()
    }

    fn has_applied(&self, source_id: &str) -> bool {
        self.applied_sources.contains(source_id)
    }

    fn apply(
        &mut self,
        reading: &Reading,
        source_id: &str,
        rain: Option<&Buckets>,
        config: &AggregationConfig,
    ) -> Result<(), MetricAggregateError> {
        if let Some(buckets) = rain {
            let start = self.hour_start;
            let histogram = self.rain.get_or_insert_with(|| {
                Histogram::empty(
                    start,
                    config.hourly_bucket_seconds,
                    config.hourly_slot_count(),
                )
            });
            merge(histogram, buckets, config.window_merge_mode);
        }
        if self.contains(reading.timestamp) {
            for (kind, value) in reading.metric_values() {
                increment_or_insert(&mut self.metrics, kind, value)?;
            }
        }
        self.applied_sources.insert(source_id.to_string());
        Ok(())
    }
}

impl WindowAggregate for DailyAggregate {
    const GRANULARITY: WindowGranularity = WindowGranularity::Daily;

    fn create(device_id: &str, start: DateTime<Utc>) -> Self {
        Self::new(device_id, start)
    }

    fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    fn version(&self) -> Option<&VersionToken> {
        self.version.as_ref()
    }

    fn has_applied(&self, source_id: &str) -> bool {
        self.applied_sources.contains(source_id)
    }

    fn apply(
        &mut self,
        reading: &Reading,
        source_id: &str,
        rain: Option<&Buckets>,
        config: &AggregationConfig,
    ) -> Result<(), MetricAggregateError> {
        if let Some(buckets) = rain {
            let start = self.day_start;
            let histogram = self.rain.get_or_insert_with(|| {
                Histogram::empty(start, config.daily_bucket_seconds, config.daily_slot_count())
            });
            merge(histogram, buckets, config.window_merge_mode);
        }
        if self.contains(reading.timestamp) {
            let hour = reading.timestamp.hour();
            for (kind, value) in reading.metric_values() {
                increment_or_insert(&mut self.metrics, kind, value)?;
                let by_hour = self.hourly_metrics.entry(kind).or_default();
                match by_hour.get_mut(&hour) {
                    Some(aggregate) => aggregate.increment(value)?,
                    None => {
                        by_hour.insert(hour, MetricAggregate::new(value));
                    }
                }
            }
        }
        self.applied_sources.insert(source_id.to_string());
        Ok(())
    }
}
