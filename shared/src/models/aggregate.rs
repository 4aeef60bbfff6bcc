//! Aggregate views: latest snapshot, hourly, daily and weekly.
//!
//! Every view carries an optional [`VersionToken`] that the store attaches on
//! load and checks on conditional writes.

use super::histogram::Histogram;
use super::metric::{MetricAggregate, MetricAggregateError, StatSummary};
use super::reading::MetricKind;
use crate::view_id::{IsoWeek, ViewId};
use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Opaque optimistic-concurrency token issued by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wraps a store-native version tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the raw tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-metric aggregates over a window.
pub type MetricMap = BTreeMap<MetricKind, MetricAggregate>;

/// Per-metric, per-hour-of-day aggregates (hour 0-23).
pub type HourlyMetricMap = BTreeMap<MetricKind, BTreeMap<u32, MetricAggregate>>;

/// Folds `value` into the aggregate for `kind`, creating it if absent.
///
/// # Errors
///
/// Returns `AlreadyFinalized` if the existing aggregate is sealed.
pub fn increment_or_insert(
    map: &mut MetricMap,
    kind: MetricKind,
    value: f64,
) -> Result<(), MetricAggregateError> {
    match map.get_mut(&kind) {
        Some(agg) => agg.increment(value),
        None => {
            map.insert(kind, MetricAggregate::new(value));
            Ok(())
        }
    }
}

/// Rolling snapshot of the most recent reading of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    /// Storage key.
    pub key: String,
    /// Short date id (`latest`).
    pub date_id: String,
    /// Owning device.
    pub device_id: String,
    /// Timestamp of the reading that produced this snapshot.
    pub last_event_at: DateTime<Utc>,
    /// Source id of that reading.
    pub last_source_id: String,
    /// Temperature, if reported.
    pub temperature: Option<f64>,
    /// Humidity, if reported.
    pub humidity: Option<f64>,
    /// Pressure, if reported.
    pub pressure: Option<f64>,
    /// Rolling rain window.
    pub rain: Option<Histogram>,
    /// Store version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
}

/// Aggregate of one device over one UTC hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    /// Storage key.
    pub key: String,
    /// Short date id (`H{yyyy-MM-ddTHH}`).
    pub date_id: String,
    /// Owning device.
    pub device_id: String,
    /// Start of the hour.
    pub hour_start: DateTime<Utc>,
    /// Whole-hour metric aggregates.
    #[serde(default)]
    pub metrics: MetricMap,
    /// Rain over the hour.
    pub rain: Option<Histogram>,
    /// Source ids already folded into this window.
    #[serde(default)]
    pub applied_sources: BTreeSet<String>,
    /// Sealed flag.
    #[serde(default)]
    pub is_finalized: bool,
    /// Store version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
}

impl HourlyAggregate {
    /// Creates an empty hourly aggregate for the hour starting at `hour_start`.
    #[must_use]
    pub fn new(device_id: impl Into<String>, hour_start: DateTime<Utc>) -> Self {
        let device_id = device_id.into();
        let id = ViewId::hourly(&device_id, &hour_start);
        Self {
            key: id.key,
            date_id: id.date_id,
            device_id,
            hour_start,
            metrics: MetricMap::new(),
            rain: None,
            applied_sources: BTreeSet::new(),
            is_finalized: false,
            version: None,
        }
    }

    /// Returns true if `ts` falls inside this hour.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.hour_start && ts < self.hour_start + TimeDelta::hours(1)
    }
}

/// Aggregate of one device over one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    /// Storage key.
    pub key: String,
    /// Short date id (`D{yyyy-MM-dd}`).
    pub date_id: String,
    /// Owning device.
    pub device_id: String,
    /// UTC midnight starting the day.
    pub day_start: DateTime<Utc>,
    /// Whole-day metric aggregates.
    #[serde(default)]
    pub metrics: MetricMap,
    /// Hour-of-day metric aggregates.
    #[serde(default)]
    pub hourly_metrics: HourlyMetricMap,
    /// Hourly-resolution rain over the day.
    pub rain: Option<Histogram>,
    /// Source ids already folded into this window.
    #[serde(default)]
    pub applied_sources: BTreeSet<String>,
    /// Sealed flag. Sealed days are never mutated again.
    #[serde(default)]
    pub is_finalized: bool,
    /// Store version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
}

impl DailyAggregate {
    /// Creates an empty daily aggregate for the day starting at `day_start`.
    #[must_use]
    pub fn new(device_id: impl Into<String>, day_start: DateTime<Utc>) -> Self {
        let device_id = device_id.into();
        let id = ViewId::daily(&device_id, &day_start);
        Self {
            key: id.key,
            date_id: id.date_id,
            device_id,
            day_start,
            metrics: MetricMap::new(),
            hourly_metrics: HourlyMetricMap::new(),
            rain: None,
            applied_sources: BTreeSet::new(),
            is_finalized: false,
            version: None,
        }
    }

    /// Returns true if `ts` falls inside this day.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.day_start && ts < self.day_start + TimeDelta::days(1)
    }

    /// Seals every metric aggregate and marks the day finalized.
    ///
    /// On error the aggregate may be partially sealed and must be discarded.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyFinalized` if the day, or any contained metric, is
    /// already sealed.
    pub fn finalize(&mut self) -> Result<(), MetricAggregateError> {
        if self.is_finalized {
            return Err(MetricAggregateError::AlreadyFinalized);
        }
        for agg in self.metrics.values_mut() {
            agg.finalize()?;
        }
        for agg in self.hourly_metrics.values_mut().flat_map(BTreeMap::values_mut) {
            agg.finalize()?;
        }
        self.is_finalized = true;
        Ok(())
    }

    /// Rain `{min, max, avg}` over the hourly slots that recorded rain.
    ///
    /// A day without any recorded rain yields the measured-zero summary.
    #[must_use]
    pub fn rain_summary(&self) -> StatSummary {
        self.rain
            .as_ref()
            .and_then(Histogram::stats)
            .map_or_else(StatSummary::zero, |(min, max, avg)| {
                StatSummary::new(min, max, avg)
            })
    }
}

/// Errors raised when folding a sealed day into a week.
#[derive(Debug, Error)]
pub enum ApplyDayError {
    /// The day belongs to another device.
    #[error("Day {day} belongs to device {found}, expected {expected}")]
    DeviceMismatch {
        /// Daily key.
        day: String,
        /// Weekly device.
        expected: String,
        /// Daily device.
        found: String,
    },

    /// The day belongs to another ISO week.
    #[error("Day {day} is outside week {week}")]
    WeekMismatch {
        /// Daily key.
        day: String,
        /// Weekly week.
        week: IsoWeek,
    },

    /// The day has not been sealed.
    #[error("Day {0} must be finalized before weekly rollup")]
    NotFinalized(String),

    /// A metric of the day could not be summarized.
    #[error("Invalid metric on day {day}: {source}")]
    Metric {
        /// Daily key.
        day: String,
        /// Underlying error.
        source: MetricAggregateError,
    },
}

/// One weekly series: a summary per ISO weekday (Mon=0 ... Sun=6) plus the
/// week-level summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklySeries {
    /// Per-weekday summaries; `None` where the day had no data.
    pub days: [Option<StatSummary>; 7],
    /// Summary over the populated days, `None` if no day is populated.
    pub summary: Option<StatSummary>,
}

impl WeeklySeries {
    /// Recomputes the week-level summary from the populated day slots.
    #[allow(clippy::cast_precision_loss)]
    pub fn recompute(&mut self) {
        let populated: Vec<StatSummary> = self.days.iter().flatten().copied().collect();
        if populated.is_empty() {
            self.summary = None;
            return;
        }
        let min = populated.iter().map(|s| s.min).fold(f64::INFINITY, f64::min);
        let max = populated.iter().map(|s| s.max).fold(f64::NEG_INFINITY, f64::max);
        let avg = populated.iter().map(|s| s.avg).sum::<f64>() / populated.len() as f64;
        self.summary = Some(StatSummary::new(min, max, avg));
    }
}

/// Aggregate of one device over one ISO week, built from sealed days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    /// Storage key.
    pub key: String,
    /// Short date id (`W{isoYear}-W{isoWeek}`).
    pub date_id: String,
    /// Owning device.
    pub device_id: String,
    /// ISO week.
    pub week: IsoWeek,
    /// Temperature series.
    #[serde(default)]
    pub temperature: WeeklySeries,
    /// Humidity series.
    #[serde(default)]
    pub humidity: WeeklySeries,
    /// Pressure series.
    #[serde(default)]
    pub pressure: WeeklySeries,
    /// Rain series.
    #[serde(default)]
    pub rain: WeeklySeries,
    /// Store version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
}

impl WeeklyAggregate {
    /// Creates an empty week with seven unpopulated day slots.
    #[must_use]
    pub fn new(device_id: impl Into<String>, week: IsoWeek) -> Self {
        let device_id = device_id.into();
        let id = ViewId::for_week(&device_id, week);
        Self {
            key: id.key,
            date_id: id.date_id,
            device_id,
            week,
            temperature: WeeklySeries::default(),
            humidity: WeeklySeries::default(),
            pressure: WeeklySeries::default(),
            rain: WeeklySeries::default(),
            version: None,
        }
    }

    fn series_mut(&mut self, kind: MetricKind) -> &mut WeeklySeries {
        match kind {
            MetricKind::Temperature => &mut self.temperature,
            MetricKind::Humidity => &mut self.humidity,
            MetricKind::Pressure => &mut self.pressure,
        }
    }

    /// Writes a sealed day into its weekday slot and recomputes the week.
    ///
    /// Applying the same day again overwrites the same slot, so re-running a
    /// rollup never double counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the day belongs to another device or week, is not
    /// finalized, or holds an unreadable metric.
    pub fn apply_day(&mut self, day: &DailyAggregate) -> Result<(), ApplyDayError> {
        if day.device_id != self.device_id {
            return Err(ApplyDayError::DeviceMismatch {
                day: day.key.clone(),
                expected: self.device_id.clone(),
                found: day.device_id.clone(),
            });
        }
        if IsoWeek::of(&day.day_start) != self.week {
            return Err(ApplyDayError::WeekMismatch {
                day: day.key.clone(),
                week: self.week,
            });
        }
        if !day.is_finalized {
            return Err(ApplyDayError::NotFinalized(day.key.clone()));
        }

        let slot = day.day_start.weekday().num_days_from_monday() as usize;

        for kind in MetricKind::ALL {
            let summary = day
                .metrics
                .get(&kind)
                .map(MetricAggregate::summary)
                .transpose()
                .map_err(|source| ApplyDayError::Metric {
                    day: day.key.clone(),
                    source,
                })?;
            let series = self.series_mut(kind);
            series.days[slot] = summary;
            series.recompute();
        }

        self.rain.days[slot] = Some(day.rain_summary());
        self.rain.recompute();
        Ok(())
    }
}

/// Any stored view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Latest snapshot.
    Latest(LatestSnapshot),
    /// Hourly view.
    Hourly(HourlyAggregate),
    /// Daily view.
    Daily(DailyAggregate),
    /// Weekly view.
    Weekly(WeeklyAggregate),
}

impl Aggregate {
    /// Storage key of the view.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Latest(a) => &a.key,
            Self::Hourly(a) => &a.key,
            Self::Daily(a) => &a.key,
            Self::Weekly(a) => &a.key,
        }
    }

    /// Short name of the view kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Latest(_) => "latest",
            Self::Hourly(_) => "hourly",
            Self::Daily(_) => "daily",
            Self::Weekly(_) => "weekly",
        }
    }

    /// Version attached by the store, if any.
    #[must_use]
    pub const fn version(&self) -> Option<&VersionToken> {
        match self {
            Self::Latest(a) => a.version.as_ref(),
            Self::Hourly(a) => a.version.as_ref(),
            Self::Daily(a) => a.version.as_ref(),
            Self::Weekly(a) => a.version.as_ref(),
        }
    }

    /// Replaces the attached version.
    pub fn set_version(&mut self, version: Option<VersionToken>) {
        match self {
            Self::Latest(a) => a.version = version,
            Self::Hourly(a) => a.version = version,
            Self::Daily(a) => a.version = version,
            Self::Weekly(a) => a.version = version,
        }
    }
}

/// A concrete view type stored as one [`Aggregate`] variant.
pub trait View: Into<Aggregate> + Sized {
    /// Kind name, matching [`Aggregate::kind`].
    const KIND: &'static str;

    /// Extracts the view, handing back the aggregate if it is another kind.
    ///
    /// # Errors
    ///
    /// Returns the aggregate unchanged when it holds a different view.
    fn from_aggregate(aggregate: Aggregate) -> Result<Self, Aggregate>;
}

impl From<LatestSnapshot> for Aggregate {
    fn from(value: LatestSnapshot) -> Self {
        Self::Latest(value)
    }
}

impl View for LatestSnapshot {
    const KIND: &'static str = "latest";

    fn from_aggregate(aggregate: Aggregate) -> Result<Self, Aggregate> {
        match aggregate {
            Aggregate::Latest(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl From<HourlyAggregate> for Aggregate {
    fn from(value: HourlyAggregate) -> Self {
        Self::Hourly(value)
    }
}

impl View for HourlyAggregate {
    const KIND: &'static str = "hourly";

    fn from_aggregate(aggregate: Aggregate) -> Result<Self, Aggregate> {
        match aggregate {
            Aggregate::Hourly(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl From<DailyAggregate> for Aggregate {
    fn from(value: DailyAggregate) -> Self {
        Self::Daily(value)
    }
}

impl View for DailyAggregate {
    const KIND: &'static str = "daily";

    fn from_aggregate(aggregate: Aggregate) -> Result<Self, Aggregate> {
        match aggregate {
            Aggregate::Daily(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl From<WeeklyAggregate> for Aggregate {
    fn from(value: WeeklyAggregate) -> Self {
        Self::Weekly(value)
    }
}

impl View for WeeklyAggregate {
    const KIND: &'static str = "weekly";

    fn from_aggregate(aggregate: Aggregate) -> Result<Self, Aggregate> {
        match aggregate {
            Aggregate::Weekly(v) => Ok(v),
            other => Err(other),
        }
    }
}
