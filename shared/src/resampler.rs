//! Rain histogram resampling.
//!
//! Converts a device's fixed-interval unit-count histogram into rainfall
//! totals keyed by epoch-aligned target buckets, then folds those buckets into
//! the dense histograms stored on aggregates.
//!
//! A source slot is assumed to span at most two target buckets. This holds
//! whenever the source interval is not wider than the target interval, which
//! [`resample`] enforces up front.
//!
//! # Example
//!
//! ```
//! use shared::chrono::{TimeZone, Utc};
//! use shared::models::RainHistogram;
//! use shared::resampler::resample;
//!
//! let start = Utc.with_ymd_and_hms(2025, 8, 14, 15, 18, 0).unwrap();
//! let hist = RainHistogram::from_counts(&[1, 0, 1, 2, 1, 0], 120, start, 5.0);
//!
//! let buckets = resample(&hist, hist.value_per_unit, 240).unwrap();
//! assert_eq!(buckets.len(), 3);
//! assert_eq!(buckets.values().sum::<f64>(), 25.0);
//! ```

use crate::models::{Histogram, MergeMode, RainHistogram};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Resampled rainfall keyed by bucket start (UTC).
pub type Buckets = BTreeMap<DateTime<Utc>, f64>;

/// Errors raised by resampling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResampleError {
    /// The target grain is finer than the source grain.
    #[error(
        "Cannot resample a {source_interval}s histogram to {target_interval}s buckets: \
         downsampling to a finer grain is not supported"
    )]
    UnsupportedDownsampling {
        /// Source slot width in seconds.
        source_interval: u32,
        /// Requested bucket width in seconds.
        target_interval: u32,
    },

    /// An interval of zero seconds was supplied.
    #[error("Histogram intervals must be positive")]
    InvalidInterval,

    /// A slot or bucket start is not representable as a UTC timestamp.
    #[error("Histogram slot timestamp is out of range")]
    TimestampOutOfRange,
}

/// Checks that a `source`-second histogram can be resampled to `target`.
///
/// # Errors
///
/// Returns `InvalidInterval` for a zero interval and `UnsupportedDownsampling`
/// when `source > target`.
pub fn ensure_supported(source: u32, target: u32) -> Result<(), ResampleError> {
    if source == 0 || target == 0 {
        return Err(ResampleError::InvalidInterval);
    }
    if source > target {
        return Err(ResampleError::UnsupportedDownsampling {
            source_interval: source,
            target_interval: target,
        });
    }
    Ok(())
}

/// Resamples `hist` into `target_interval_seconds`-wide buckets.
///
/// Each non-empty slot contributes `count * value_per_unit`. A slot crossing a
/// bucket boundary is split by the fraction of its duration on either side.
///
/// # Errors
///
/// Returns an error if the target grain is finer than the source grain, an
/// interval is zero, or a slot falls outside the representable time range.
#[allow(clippy::cast_precision_loss)]
pub fn resample(
    hist: &RainHistogram,
    value_per_unit: f64,
    target_interval_seconds: u32,
) -> Result<Buckets, ResampleError> {
    ensure_supported(hist.interval_seconds, target_interval_seconds)?;

    let source = i64::from(hist.interval_seconds);
    let target = i64::from(target_interval_seconds);
    let origin = hist.start_time.timestamp();
    let slot_count = hist.slot_count();

    let mut buckets = Buckets::new();
    for (&slot, &count) in hist.unit_counts.range(..slot_count) {
        if count == 0 {
            continue;
        }
        let value = f64::from(count) * value_per_unit;
        let slot_start = i64::from(slot)
            .checked_mul(source)
            .and_then(|offset| offset.checked_add(origin))
            .ok_or(ResampleError::TimestampOutOfRange)?;
        let slot_end = slot_start
            .checked_add(source)
            .ok_or(ResampleError::TimestampOutOfRange)?;

        let first = slot_start.div_euclid(target);
        let last = (slot_end - 1).div_euclid(target);

        if first == last {
            add(&mut buckets, first * target, value)?;
        } else {
            let boundary = last * target;
            let proportion = (boundary - slot_start) as f64 / source as f64;
            add(&mut buckets, first * target, value * proportion)?;
            add(&mut buckets, boundary, value * (1.0 - proportion))?;
        }
    }

    Ok(buckets)
}

fn add(buckets: &mut Buckets, bucket_start: i64, value: f64) -> Result<(), ResampleError> {
    let key = DateTime::from_timestamp(bucket_start, 0).ok_or(ResampleError::TimestampOutOfRange)?;
    *buckets.entry(key).or_insert(0.0) += value;
    Ok(())
}

/// Folds `buckets` into `target` using `mode`.
///
/// Buckets before the histogram start or past its last slot are dropped.
pub fn merge(target: &mut Histogram, buckets: &Buckets, mode: MergeMode) {
    let interval = i64::from(target.interval_seconds);
    if interval == 0 {
        return;
    }
    for (ts, value) in buckets.range(target.start_time..) {
        let offset = (*ts - target.start_time).num_seconds();
        let Ok(index) = usize::try_from(offset / interval) else {
            continue;
        };
        if let Some(slot) = target.values.get_mut(index) {
            *slot = mode.apply(*slot, *value);
        }
    }
}

/// Distinct hour starts touched by `buckets`.
#[must_use]
pub fn affected_hour_buckets(buckets: &Buckets) -> BTreeSet<DateTime<Utc>> {
    buckets
        .keys()
        .filter_map(|ts| ts.duration_trunc(TimeDelta::hours(1)).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 14, h, m, 0).unwrap()
    }

    fn sample() -> RainHistogram {
        RainHistogram::from_counts(&[1, 0, 1, 2, 1, 0], 120, at(15, 18), 5.0)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn test_boundary_split_240() {
        let buckets = resample(&sample(), 5.0, 240).unwrap();

        let expected = Buckets::from([(at(15, 16), 5.0), (at(15, 20), 5.0), (at(15, 24), 15.0)]);
        assert_eq!(buckets, expected);
    }

    #[test]
    fn test_boundary_split_300_is_epoch_aligned() {
        // The 15:24-15:26 slot straddles 15:25 and is split in half.
        let buckets = resample(&sample(), 5.0, 300).unwrap();

        assert_eq!(buckets.len(), 3);
        assert_close(buckets[&at(15, 15)], 5.0);
        assert_close(buckets[&at(15, 20)], 10.0);
        assert_close(buckets[&at(15, 25)], 10.0);
    }

    #[test]
    fn test_conservation_when_duration_is_multiple_of_target() {
        let hist = RainHistogram::from_counts(&[3, 1, 0, 7, 2, 2, 0, 5, 1, 4], 60, at(9, 57), 0.2);
        for target in [60, 120, 300, 600] {
            let buckets = resample(&hist, hist.value_per_unit, target).unwrap();
            let total: f64 = buckets.values().sum();
            #[allow(clippy::cast_precision_loss)]
            let expected = hist.total_units() as f64 * 0.2;
            assert_close(total, expected);
        }
    }

    #[test]
    fn test_identity_resample_keeps_slots() {
        let hist = RainHistogram::from_counts(&[2, 0, 3], 300, at(10, 0), 0.5);
        let buckets = resample(&hist, 0.5, 300).unwrap();

        assert_eq!(buckets, Buckets::from([(at(10, 0), 1.0), (at(10, 10), 1.5)]));
    }

    #[test]
    fn test_finer_target_is_rejected() {
        let err = resample(&sample(), 5.0, 60).unwrap_err();
        assert_eq!(
            err,
            ResampleError::UnsupportedDownsampling {
                source_interval: 120,
                target_interval: 60
            }
        );
    }

    #[test]
    fn test_zero_target_is_rejected() {
        assert_eq!(resample(&sample(), 5.0, 0), Err(ResampleError::InvalidInterval));
    }

    #[test]
    fn test_counts_past_declared_slot_count_are_ignored() {
        let mut hist = RainHistogram::from_counts(&[1, 1], 60, at(10, 0), 1.0);
        hist.unit_counts.insert(5, 9);
        let buckets = resample(&hist, 1.0, 60).unwrap();
        assert_eq!(buckets.values().sum::<f64>(), 2.0);
    }

    #[test]
    fn test_slot_offset_overflow_is_out_of_range() {
        let mut hist = RainHistogram::from_counts(&[], u32::MAX, at(10, 0), 1.0);
        hist.unit_counts.insert(u32::MAX - 1, 1);
        hist.slot_count = None;

        assert_eq!(
            resample(&hist, 1.0, u32::MAX),
            Err(ResampleError::TimestampOutOfRange)
        );
    }

    #[test]
    fn test_merge_sum_folds_fine_buckets_into_coarse_slots() {
        let mut day = Histogram::empty(at(0, 0), 3600, 24);
        let buckets = Buckets::from([(at(15, 15), 5.0), (at(15, 20), 10.0), (at(16, 0), 2.0)]);

        merge(&mut day, &buckets, MergeMode::Sum);
        merge(&mut day, &buckets, MergeMode::Sum);

        assert_eq!(day.values[15], 30.0);
        assert_eq!(day.values[16], 4.0);
    }

    #[test]
    fn test_merge_max_does_not_accumulate() {
        let mut window = Histogram::empty(at(15, 15), 300, 12);
        let buckets = Buckets::from([(at(15, 20), 10.0)]);

        merge(&mut window, &buckets, MergeMode::Max);
        merge(&mut window, &buckets, MergeMode::Max);

        assert_eq!(window.values[1], 10.0);
        assert_eq!(window.total(), 10.0);
    }

    #[test]
    fn test_merge_drops_out_of_range_buckets() {
        let mut window = Histogram::empty(at(15, 0), 300, 12);
        let buckets = Buckets::from([(at(14, 55), 1.0), (at(16, 0), 1.0), (at(15, 55), 2.0)]);

        merge(&mut window, &buckets, MergeMode::Sum);

        assert_eq!(window.total(), 2.0);
        assert_eq!(window.values[11], 2.0);
    }

    #[test]
    fn test_affected_hours_straddling_boundary() {
        let hist = RainHistogram::from_counts(&[1, 1, 1], 300, at(15, 50), 1.0);
        let buckets = resample(&hist, 1.0, 300).unwrap();

        let hours: Vec<_> = affected_hour_buckets(&buckets).into_iter().collect();
        assert_eq!(hours, vec![at(15, 0), at(16, 0)]);
    }
}
