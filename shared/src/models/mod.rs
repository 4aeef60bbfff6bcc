//! Data models for the weather aggregation worker.
//!
//! This module contains the inbound reading, the rain histogram value types,
//! the running metric aggregate and the stored aggregate views.

pub mod aggregate;
pub mod histogram;
pub mod metric;
pub mod reading;

pub use aggregate::{
    increment_or_insert, Aggregate, ApplyDayError, DailyAggregate, HourlyAggregate,
    HourlyMetricMap, LatestSnapshot, MetricMap, VersionToken, View, WeeklyAggregate, WeeklySeries,
};
pub use histogram::{Histogram, MergeMode, RainHistogram};
pub use metric::{MetricAggregate, MetricAggregateDocument, MetricAggregateError, StatSummary};
pub use reading::{MetricKind, Reading, ReadingValidationError};
