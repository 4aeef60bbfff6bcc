//! Hot-path aggregation configuration.
//!
//! Bucket widths and merge policies for the latest snapshot and the hourly
//! and daily windows. Passed explicitly to the aggregation service.

use crate::models::MergeMode;
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: u32 = 3600;
const SECONDS_PER_DAY: u32 = 86_400;

/// Configuration of the aggregation hot path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Bucket width of the rolling latest rain window.
    pub latest_bucket_seconds: u32,
    /// Number of buckets in the rolling latest rain window.
    pub latest_slot_count: u32,
    /// Bucket width of hourly rain histograms.
    pub hourly_bucket_seconds: u32,
    /// Bucket width of daily rain histograms.
    pub daily_bucket_seconds: u32,
    /// How resampled rain folds into the latest window.
    pub latest_merge_mode: MergeMode,
    /// How resampled rain folds into hourly and daily windows.
    pub window_merge_mode: MergeMode,
    /// Attempts per window write before a version conflict is reported.
    pub window_max_attempts: u32,
}

impl AggregationConfig {
    /// Creates the default configuration: five-minute latest and hourly
    /// buckets, hourly buckets for days, MAX for latest and SUM for windows.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest_bucket_seconds: 300,
            latest_slot_count: 12,
            hourly_bucket_seconds: 300,
            daily_bucket_seconds: SECONDS_PER_HOUR,
            latest_merge_mode: MergeMode::Max,
            window_merge_mode: MergeMode::Sum,
            window_max_attempts: 3,
        }
    }

    /// Sets the merge mode of the latest window.
    #[must_use]
    pub const fn with_latest_merge_mode(mut self, mode: MergeMode) -> Self {
        self.latest_merge_mode = mode;
        self
    }

    /// Sets the merge mode of hourly and daily windows.
    #[must_use]
    pub const fn with_window_merge_mode(mut self, mode: MergeMode) -> Self {
        self.window_merge_mode = mode;
        self
    }

    /// Number of slots in an hourly rain histogram.
    #[must_use]
    pub const fn hourly_slot_count(&self) -> usize {
        match SECONDS_PER_HOUR.checked_div(self.hourly_bucket_seconds) {
            Some(slots) => slots as usize,
            None => 0,
        }
    }

    /// Number of slots in a daily rain histogram.
    #[must_use]
    pub const fn daily_slot_count(&self) -> usize {
        match SECONDS_PER_DAY.checked_div(self.daily_bucket_seconds) {
            Some(slots) => slots as usize,
            None => 0,
        }
    }

    /// Bucket widths every reading is resampled to.
    #[must_use]
    pub const fn bucket_widths(&self) -> [u32; 3] {
        [
            self.latest_bucket_seconds,
            self.hourly_bucket_seconds,
            self.daily_bucket_seconds,
        ]
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any bucket width, the latest slot count or the attempt count is zero
    /// - The hourly width does not evenly divide an hour
    /// - The daily width does not evenly divide a day
    pub fn validate(&self) -> Result<(), String> {
        if self.latest_bucket_seconds == 0
            || self.hourly_bucket_seconds == 0
            || self.daily_bucket_seconds == 0
        {
            return Err("Bucket widths must be greater than zero".to_string());
        }
        if self.window_max_attempts == 0 {
            return Err("Window writes need at least one attempt".to_string());
        }
        if self.latest_slot_count == 0 {
            return Err("Latest window must have at least one slot".to_string());
        }
        if SECONDS_PER_HOUR % self.hourly_bucket_seconds != 0 {
            return Err(format!(
                "Hourly bucket width {}s does not divide an hour",
                self.hourly_bucket_seconds
            ));
        }
        if SECONDS_PER_DAY % self.daily_bucket_seconds != 0 {
            return Err(format!(
                "Daily bucket width {}s does not divide a day",
                self.daily_bucket_seconds
            ));
        }
        Ok(())
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AggregationConfig::default();
        assert_eq!(config.latest_merge_mode, MergeMode::Max);
        assert_eq!(config.window_merge_mode, MergeMode::Sum);
        assert_eq!(config.hourly_slot_count(), 12);
        assert_eq!(config.daily_slot_count(), 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_width() {
        let config = AggregationConfig {
            hourly_bucket_seconds: 0,
            ..AggregationConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("greater than zero"));
    }

    #[test]
    fn test_validate_uneven_daily_width() {
        let config = AggregationConfig {
            daily_bucket_seconds: 7000,
            ..AggregationConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("divide a day"));
    }

    #[test]
    fn test_merge_mode_builders() {
        let config = AggregationConfig::new().with_latest_merge_mode(MergeMode::Sum);
        assert_eq!(config.latest_merge_mode, MergeMode::Sum);
        assert_eq!(config.window_merge_mode, MergeMode::Sum);
    }

    #[test]
    fn test_config_serialization() {
        let json = serde_json::to_string(&AggregationConfig::default()).unwrap();
        assert!(json.contains("\"latest_merge_mode\":\"max\""));
        let parsed: AggregationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, AggregationConfig::default());
    }
}
