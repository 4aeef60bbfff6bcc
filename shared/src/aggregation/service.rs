//! Hot-path aggregation service.
//!
//! Applies one reading to the latest snapshot and to every hourly and daily
//! window its timestamp or rain histogram touches. Window writes are
//! conditional on the version read; duplicate deliveries are recognised by
//! source id, so a reading can always be retried as a whole.

use super::window::{WindowAggregate, WindowGranularity};
use super::AggregationError;
use crate::config::AggregationConfig;
use crate::models::{
    Aggregate, DailyAggregate, Histogram, HourlyAggregate, LatestSnapshot, Reading, VersionToken,
};
use crate::resampler::{
    affected_hour_buckets, ensure_supported, merge, resample, Buckets, ResampleError,
};
use crate::storage::{AggregateStore, AggregateStoreExt, WriteCondition};
use crate::view_id::ViewId;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Keys touched by one window update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowOutcome {
    /// Windows the reading was folded into.
    pub updated: Vec<String>,
    /// Windows that had already seen the reading.
    pub duplicates: Vec<String>,
    /// Sealed windows the reading was dropped from.
    pub sealed: Vec<String>,
}

/// Summary of [`AggregationService::apply_reading`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    /// Reporting device.
    pub device_id: String,
    /// Idempotency key of the reading.
    pub source_id: String,
    /// Version of the refreshed latest snapshot.
    pub latest_version: VersionToken,
    /// Hourly windows.
    pub hourly: WindowOutcome,
    /// Daily windows.
    pub daily: WindowOutcome,
}

enum WindowUpdate {
    Updated,
    Duplicate,
    Sealed,
}

/// Applies readings to the latest, hourly and daily views.
#[derive(Clone)]
pub struct AggregationService {
    store: Arc<dyn AggregateStore>,
    config: AggregationConfig,
}

impl AggregationService {
    /// Creates a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, config: AggregationConfig) -> Self {
        Self { store, config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Runs the whole hot path for one reading: latest, hourly, then daily.
    ///
    /// Every configured resample width is checked before anything is written,
    /// so a histogram that cannot be resampled leaves all views untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the reading is structurally invalid, its histogram
    /// cannot be resampled, or a store write fails.
    pub fn apply_reading(&self, reading: &Reading) -> Result<ApplyOutcome, AggregationError> {
        reading.validate_reading()?;
        if let Some(hist) = &reading.rain {
            for width in self.config.bucket_widths() {
                ensure_supported(hist.interval_seconds, width)?;
            }
        }

        let latest_version = self.save_latest(reading)?;
        let hourly = self.update_window(reading, WindowGranularity::Hourly)?;
        let daily = self.update_window(reading, WindowGranularity::Daily)?;

        tracing::info!(
            device_id = %reading.device_id,
            timestamp = %reading.timestamp,
            hourly_updated = hourly.updated.len(),
            daily_updated = daily.updated.len(),
            duplicates = hourly.duplicates.len() + daily.duplicates.len(),
            "Applied reading"
        );

        Ok(ApplyOutcome {
            device_id: reading.device_id.clone(),
            source_id: reading.source_id(),
            latest_version,
            hourly,
            daily,
        })
    }

    /// Overwrites the device's latest snapshot with this reading.
    ///
    /// The rain window starts at the bucket containing the histogram start and
    /// is filled with the configured latest merge mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be resampled or the write
    /// fails.
    pub fn save_latest(&self, reading: &Reading) -> Result<VersionToken, AggregationError> {
        let width = self.config.latest_bucket_seconds;
        let rain = match &reading.rain {
            Some(hist) => {
                let buckets = resample(hist, hist.value_per_unit, width)?;
                let start = align(hist.start_time, width)?;
                let mut window =
                    Histogram::empty(start, width, self.config.latest_slot_count as usize);
                merge(&mut window, &buckets, self.config.latest_merge_mode);
                Some(window)
            }
            None => None,
        };

        let id = ViewId::latest(&reading.device_id);
        let snapshot = LatestSnapshot {
            key: id.key,
            date_id: id.date_id,
            device_id: reading.device_id.clone(),
            last_event_at: reading.timestamp,
            last_source_id: reading.source_id(),
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            rain,
            version: None,
        };

        let version = self
            .store
            .upsert(&Aggregate::Latest(snapshot), WriteCondition::Unconditional)?;
        tracing::debug!(device_id = %reading.device_id, %version, "Saved latest snapshot");
        Ok(version)
    }

    /// Folds the reading into every window of `granularity` it touches.
    ///
    /// Sealed windows are skipped silently and windows that already recorded
    /// the reading's source id are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be resampled, a metric update
    /// is rejected, or a write fails after the configured attempts.
    pub fn update_window(
        &self,
        reading: &Reading,
        granularity: WindowGranularity,
    ) -> Result<WindowOutcome, AggregationError> {
        match granularity {
            WindowGranularity::Hourly => self.update_windows::<HourlyAggregate>(reading),
            WindowGranularity::Daily => self.update_windows::<DailyAggregate>(reading),
        }
    }

    fn update_windows<W: WindowAggregate>(
        &self,
        reading: &Reading,
    ) -> Result<WindowOutcome, AggregationError> {
        let granularity = W::GRANULARITY;
        let buckets = reading
            .rain
            .as_ref()
            .map(|hist| {
                resample(
                    hist,
                    hist.value_per_unit,
                    granularity.bucket_seconds(&self.config),
                )
            })
            .transpose()?;

        let mut starts = BTreeSet::from([granularity.window_start(reading.timestamp)?]);
        if let Some(buckets) = &buckets {
            for hour in affected_hour_buckets(buckets) {
                starts.insert(granularity.window_start(hour)?);
            }
        }

        let source_id = reading.source_id();
        let mut outcome = WindowOutcome::default();
        for start in starts {
            let key = granularity.key(&reading.device_id, start);
            match self.apply_to_window::<W>(&key, start, reading, &source_id, buckets.as_ref())? {
                WindowUpdate::Updated => outcome.updated.push(key),
                WindowUpdate::Duplicate => {
                    tracing::debug!(%key, %source_id, "Skipping duplicate reading");
                    outcome.duplicates.push(key);
                }
                WindowUpdate::Sealed => {
                    tracing::debug!(%key, %source_id, "Dropping reading for finalized window");
                    outcome.sealed.push(key);
                }
            }
        }
        Ok(outcome)
    }

    fn apply_to_window<W: WindowAggregate>(
        &self,
        key: &str,
        start: DateTime<Utc>,
        reading: &Reading,
        source_id: &str,
        buckets: Option<&Buckets>,
    ) -> Result<WindowUpdate, AggregationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut window = self
                .store
                .get_view::<W>(key)?
                .unwrap_or_else(|| W::create(&reading.device_id, start));

            if window.is_finalized() {
                return Ok(WindowUpdate::Sealed);
            }
            if window.has_applied(source_id) {
                return Ok(WindowUpdate::Duplicate);
            }

            window.apply(reading, source_id, buckets, &self.config)?;
            let condition = WriteCondition::expecting(window.version());
            let aggregate: Aggregate = window.into();
            match self.store.upsert(&aggregate, condition) {
                Ok(_) => return Ok(WindowUpdate::Updated),
                Err(e) if e.is_conflict() && attempt < self.config.window_max_attempts => {
                    tracing::debug!(%key, attempt, "Window changed concurrently, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn align(ts: DateTime<Utc>, width: u32) -> Result<DateTime<Utc>, ResampleError> {
    ts.duration_trunc(TimeDelta::seconds(i64::from(width)))
        .map_err(|_| ResampleError::TimestampOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, RainHistogram};
    use crate::storage::{DailyPage, InMemoryAggregateStore, PageCursor, StoreError};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, d, h, m, 0).unwrap()
    }

    fn service() -> (Arc<InMemoryAggregateStore>, AggregationService) {
        let store = InMemoryAggregateStore::new_shared();
        let service = AggregationService::new(store.clone(), AggregationConfig::default());
        (store, service)
    }

    fn rainy_reading() -> Reading {
        let hist = RainHistogram::from_counts(&[1, 0, 1, 2, 1, 0], 120, at(14, 15, 18), 5.0);
        Reading::new("dev", at(14, 15, 30))
            .with_temperature(21.0)
            .with_humidity(40.0)
            .with_rain(hist)
    }

    fn daily(store: &InMemoryAggregateStore, key: &str) -> DailyAggregate {
        store.get_view::<DailyAggregate>(key).unwrap().unwrap()
    }

    #[test]
    fn test_apply_reading_creates_all_views() {
        let (store, service) = service();

        let outcome = service.apply_reading(&rainy_reading()).unwrap();

        assert_eq!(outcome.hourly.updated, vec!["dev|hourly|2025-08-14T15"]);
        assert_eq!(outcome.daily.updated, vec!["dev|daily|2025-08-14"]);
        assert_eq!(store.len().unwrap(), 3);

        let day = daily(&store, "dev|daily|2025-08-14");
        assert_eq!(day.metrics[&MetricKind::Temperature].count(), Some(1));
        assert_eq!(day.rain.as_ref().unwrap().values[15], 25.0);
    }

    #[test]
    fn test_latest_uses_max_merge_in_aligned_window() {
        let (store, service) = service();
        let reading = rainy_reading();

        service.save_latest(&reading).unwrap();
        service.save_latest(&reading).unwrap();

        let latest = store
            .get_view::<LatestSnapshot>("dev|latest")
            .unwrap()
            .unwrap();
        let rain = latest.rain.unwrap();
        assert_eq!(rain.start_time, at(14, 15, 15));
        assert_eq!(rain.slot_count(), 12);
        assert_eq!(rain.total(), 25.0);
        assert_eq!(latest.last_source_id, "dev@2025-08-14T15:30:00Z");
        assert_eq!(latest.temperature, Some(21.0));
    }

    #[test]
    fn test_duplicate_reading_is_not_double_counted() {
        let (store, service) = service();
        let reading = rainy_reading();

        service.apply_reading(&reading).unwrap();
        let before = daily(&store, "dev|daily|2025-08-14");
        let outcome = service.apply_reading(&reading).unwrap();
        let after = daily(&store, "dev|daily|2025-08-14");

        assert_eq!(outcome.daily.duplicates, vec!["dev|daily|2025-08-14"]);
        assert!(outcome.daily.updated.is_empty());
        assert_eq!(before.metrics, after.metrics);
        assert_eq!(before.rain, after.rain);
        assert_eq!(before.version, after.version);
    }

    #[test]
    fn test_distinct_readings_accumulate() {
        let (store, service) = service();
        service.apply_reading(&rainy_reading()).unwrap();
        service
            .apply_reading(&rainy_reading().with_source_id("second"))
            .unwrap();

        let day = daily(&store, "dev|daily|2025-08-14");
        assert_eq!(day.metrics[&MetricKind::Humidity].count(), Some(2));
        assert_eq!(day.rain.as_ref().unwrap().values[15], 50.0);
        assert_eq!(day.applied_sources.len(), 2);
    }

    #[test]
    fn test_sealed_daily_is_left_unchanged() {
        let (store, service) = service();
        service.apply_reading(&rainy_reading()).unwrap();
        let mut day = daily(&store, "dev|daily|2025-08-14");
        day.finalize().unwrap();
        let version = day.version.clone();
        store
            .upsert(&Aggregate::Daily(day), WriteCondition::expecting(version.as_ref()))
            .unwrap();
        let sealed = daily(&store, "dev|daily|2025-08-14");

        let outcome = service
            .update_window(&rainy_reading().with_source_id("late"), WindowGranularity::Daily)
            .unwrap();

        assert_eq!(outcome.sealed, vec!["dev|daily|2025-08-14"]);
        assert_eq!(daily(&store, "dev|daily|2025-08-14"), sealed);
    }

    #[test]
    fn test_rain_straddling_hour_touches_both_hours() {
        let (store, service) = service();
        let hist = RainHistogram::from_counts(&[1, 1, 1, 1], 300, at(14, 15, 50), 1.0);
        let reading = Reading::new("dev", at(14, 16, 10)).with_temperature(19.0).with_rain(hist);

        let outcome = service.update_window(&reading, WindowGranularity::Hourly).unwrap();

        assert_eq!(
            outcome.updated,
            vec!["dev|hourly|2025-08-14T15", "dev|hourly|2025-08-14T16"]
        );
        let earlier = store
            .get_view::<HourlyAggregate>("dev|hourly|2025-08-14T15")
            .unwrap()
            .unwrap();
        assert!(earlier.metrics.is_empty());
        assert_eq!(earlier.rain.unwrap().total(), 2.0);
    }

    #[test]
    fn test_unsupported_histogram_writes_nothing() {
        let (store, service) = service();
        let hist = RainHistogram::from_counts(&[1, 1], 600, at(14, 15, 0), 1.0);
        let reading = Reading::new("dev", at(14, 15, 30)).with_temperature(20.0).with_rain(hist);

        let err = service.apply_reading(&reading).unwrap_err();

        assert!(matches!(
            err,
            AggregationError::Resample(ResampleError::UnsupportedDownsampling { .. })
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_invalid_reading_is_rejected() {
        let (_, service) = service();
        let err = service.apply_reading(&Reading::new("", at(14, 15, 0))).unwrap_err();
        assert!(matches!(err, AggregationError::InvalidReading(_)));
    }

    /// Fails the first `conflicts` conditional writes with a version conflict.
    struct ConflictingStore {
        inner: InMemoryAggregateStore,
        conflicts: AtomicUsize,
    }

    impl AggregateStore for ConflictingStore {
        fn get(&self, key: &str) -> Result<Option<Aggregate>, StoreError> {
            self.inner.get(key)
        }

        fn upsert(
            &self,
            aggregate: &Aggregate,
            condition: WriteCondition,
        ) -> Result<VersionToken, StoreError> {
            if condition != WriteCondition::Unconditional
                && self
                    .conflicts
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StoreError::Conflict {
                    key: aggregate.key().to_string(),
                });
            }
            self.inner.upsert(aggregate, condition)
        }

        fn query_unfinalized_before(
            &self,
            cutoff: DateTime<Utc>,
            page_size: usize,
            cursor: Option<&PageCursor>,
        ) -> Result<DailyPage, StoreError> {
            self.inner.query_unfinalized_before(cutoff, page_size, cursor)
        }

        fn read_many(&self, keys: &[String]) -> Result<Vec<Aggregate>, StoreError> {
            self.inner.read_many(keys)
        }
    }

    #[test]
    fn test_window_conflict_is_retried() {
        let store = Arc::new(ConflictingStore {
            inner: InMemoryAggregateStore::new(),
            conflicts: AtomicUsize::new(2),
        });
        let service = AggregationService::new(store.clone(), AggregationConfig::default());

        let outcome = service
            .update_window(&rainy_reading(), WindowGranularity::Daily)
            .unwrap();

        assert_eq!(outcome.updated.len(), 1);
        let day = store
            .get_view::<DailyAggregate>("dev|daily|2025-08-14")
            .unwrap()
            .unwrap();
        assert_eq!(day.metrics[&MetricKind::Temperature].count(), Some(1));
    }

    #[test]
    fn test_window_conflict_exhausts_attempts() {
        let store = Arc::new(ConflictingStore {
            inner: InMemoryAggregateStore::new(),
            conflicts: AtomicUsize::new(10),
        });
        let service = AggregationService::new(store, AggregationConfig::default());

        let err = service
            .update_window(&rainy_reading(), WindowGranularity::Daily)
            .unwrap_err();
        assert!(matches!(err, AggregationError::Store(StoreError::Conflict { .. })));
    }
}
