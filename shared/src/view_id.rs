//! Storage key derivation for aggregate views.
//!
//! Keys are derived from the device id and the UTC form of a timestamp.
//! Offset-aware timestamps are converted to UTC first, so `00:15+02:00`
//! belongs to the *previous* UTC day and hour.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// ISO-8601 week (Monday-start, ISO year boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IsoWeek {
    /// ISO week-numbering year.
    pub year: i32,
    /// Week number, 1-53.
    pub week: u32,
}

impl IsoWeek {
    /// Returns the ISO week containing the UTC form of `ts`.
    #[must_use]
    pub fn of<Tz: TimeZone>(ts: &DateTime<Tz>) -> Self {
        let iso = ts.with_timezone(&Utc).iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Builds a week from its parts, `None` if the week does not exist.
    #[must_use]
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }
}

impl std::fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// A derived storage key and its short date id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewId {
    /// Full storage key, e.g. `dev|daily|2025-09-11`.
    pub key: String,
    /// Date id stored next to the view, e.g. `D2025-09-11`.
    pub date_id: String,
}

impl ViewId {
    /// Key of the rolling latest snapshot.
    #[must_use]
    pub fn latest(device_id: &str) -> Self {
        Self {
            key: format!("{device_id}|latest"),
            date_id: "latest".to_string(),
        }
    }

    /// Key of the hourly view containing `ts`.
    #[must_use]
    pub fn hourly<Tz: TimeZone>(device_id: &str, ts: &DateTime<Tz>) -> Self {
        let utc = ts.with_timezone(&Utc);
        let stamp = utc.format("%Y-%m-%dT%H");
        Self {
            key: format!("{device_id}|hourly|{stamp}"),
            date_id: format!("H{stamp}"),
        }
    }

    /// Key of the daily view containing `ts`.
    #[must_use]
    pub fn daily<Tz: TimeZone>(device_id: &str, ts: &DateTime<Tz>) -> Self {
        let utc = ts.with_timezone(&Utc);
        let stamp = utc.format("%Y-%m-%d");
        Self {
            key: format!("{device_id}|daily|{stamp}"),
            date_id: format!("D{stamp}"),
        }
    }

    /// Key of the weekly view containing `ts`.
    #[must_use]
    pub fn weekly<Tz: TimeZone>(device_id: &str, ts: &DateTime<Tz>) -> Self {
        Self::for_week(device_id, IsoWeek::of(ts))
    }

    /// Key of the weekly view for an explicit ISO week.
    #[must_use]
    pub fn for_week(device_id: &str, week: IsoWeek) -> Self {
        Self {
            key: format!("{device_id}|weekly|{week}"),
            date_id: format!("W{week}"),
        }
    }

    /// Key of the monthly view containing `ts`.
    #[must_use]
    pub fn monthly<Tz: TimeZone>(device_id: &str, ts: &DateTime<Tz>) -> Self {
        let utc = ts.with_timezone(&Utc);
        let stamp = utc.format("%Y-%m");
        Self {
            key: format!("{device_id}|monthly|{stamp}"),
            date_id: format!("M{stamp}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    const DEVICE: &str = "Device123";

    fn at(
        y: i32,
        mo: u32,
        d: u32,
        h: u32,
        mi: u32,
        offset_minutes: i32,
    ) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_minutes * 60)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_latest_key() {
        let id = ViewId::latest(DEVICE);
        assert_eq!(id.key, "Device123|latest");
        assert_eq!(id.date_id, "latest");
    }

    #[test]
    fn test_hourly_key_utc() {
        let id = ViewId::hourly(DEVICE, &at(2025, 9, 11, 15, 45, 0));
        assert_eq!(id.key, "Device123|hourly|2025-09-11T15");
        assert_eq!(id.date_id, "H2025-09-11T15");
    }

    #[test]
    fn test_hourly_key_normalizes_offsets() {
        let cases = [
            (at(2025, 9, 11, 15, 45, 120), "Device123|hourly|2025-09-11T13"),
            (at(2025, 9, 11, 15, 45, -300), "Device123|hourly|2025-09-11T20"),
            (at(2025, 9, 11, 15, 45, 330), "Device123|hourly|2025-09-11T10"),
            (at(2025, 9, 11, 0, 15, 120), "Device123|hourly|2025-09-10T22"),
        ];
        for (ts, expected) in cases {
            assert_eq!(ViewId::hourly(DEVICE, &ts).key, expected, "for {ts}");
        }
    }

    #[test]
    fn test_daily_key_normalizes_offsets() {
        let cases = [
            (at(2025, 9, 11, 15, 45, 120), "Device123|daily|2025-09-11"),
            (at(2025, 9, 11, 15, 45, -300), "Device123|daily|2025-09-11"),
            (at(2025, 9, 11, 0, 15, 120), "Device123|daily|2025-09-10"),
            (at(2025, 1, 1, 0, 30, 120), "Device123|daily|2024-12-31"),
            (at(2024, 2, 29, 12, 0, 0), "Device123|daily|2024-02-29"),
        ];
        for (ts, expected) in cases {
            assert_eq!(ViewId::daily(DEVICE, &ts).key, expected, "for {ts}");
        }
    }

    #[test]
    fn test_monthly_key_normalizes_offsets() {
        assert_eq!(
            ViewId::monthly(DEVICE, &at(2025, 10, 1, 0, 30, 120)).key,
            "Device123|monthly|2025-09"
        );
        assert_eq!(
            ViewId::monthly(DEVICE, &at(2025, 12, 31, 23, 30, -120)).key,
            "Device123|monthly|2026-01"
        );
    }

    #[test]
    fn test_weekly_key_uses_iso_year() {
        // 2024-12-30 is Monday of ISO week 1 of 2025.
        let id = ViewId::weekly(DEVICE, &at(2024, 12, 30, 12, 0, 0));
        assert_eq!(id.key, "Device123|weekly|2025-W01");
        assert_eq!(id.date_id, "W2025-W01");

        // 2021-01-03 is Sunday of ISO week 53 of 2020.
        let id = ViewId::weekly(DEVICE, &at(2021, 1, 3, 12, 0, 0));
        assert_eq!(id.key, "Device123|weekly|2020-W53");
    }

    #[test]
    fn test_weekly_key_offset_crosses_week_boundary() {
        // Monday 00:30 at +02:00 is still Sunday in UTC.
        let id = ViewId::weekly(DEVICE, &at(2025, 9, 15, 0, 30, 120));
        assert_eq!(id.key, "Device123|weekly|2025-W37");
    }

    #[test]
    fn test_iso_week_new_rejects_missing_week() {
        assert!(IsoWeek::new(2025, 53).is_none());
        assert!(IsoWeek::new(2020, 53).is_some());
    }
}
