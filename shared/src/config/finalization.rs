//! Finalization sweep configuration.
//!
//! Controls the cutoff, paging, time budget and weekly retry policy of the
//! scheduled sweep that seals aged daily aggregates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the finalization sweep and weekly rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationConfig {
    /// Whether the scheduled sweep runs at all.
    pub enabled: bool,
    /// Days older than `today - lookback_hours` are sealed.
    pub lookback_hours: u32,
    /// Wall-clock budget of one sweep invocation.
    pub time_budget: Duration,
    /// Daily aggregates fetched per page.
    pub page_size: usize,
    /// Attempts per weekly group before the run fails.
    pub weekly_max_attempts: u32,
    /// Lower bound of the randomized conflict backoff, in milliseconds.
    pub backoff_min_ms: u64,
    /// Upper bound of the randomized conflict backoff, in milliseconds.
    pub backoff_max_ms: u64,
    /// Interval between scheduled sweeps.
    pub schedule_interval: Duration,
}

impl FinalizationConfig {
    /// Creates the default configuration.
    ///
    /// Defaults: 24h lookback, 9 minute budget, pages of 100, five weekly
    /// attempts with a 10-100ms backoff, one sweep per day.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            lookback_hours: 24,
            time_budget: Duration::from_secs(9 * 60),
            page_size: 100,
            weekly_max_attempts: 5,
            backoff_min_ms: 10,
            backoff_max_ms: 100,
            schedule_interval: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the time budget.
    #[must_use]
    pub const fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the number of weekly attempts.
    #[must_use]
    pub const fn with_weekly_max_attempts(mut self, attempts: u32) -> Self {
        self.weekly_max_attempts = attempts;
        self
    }

    /// Sets the backoff bounds.
    #[must_use]
    pub const fn with_backoff_ms(mut self, min: u64, max: u64) -> Self {
        self.backoff_min_ms = min;
        self.backoff_max_ms = max;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Page size or weekly attempts is zero
    /// - The backoff range is inverted
    /// - The schedule interval is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("Page size must be greater than zero".to_string());
        }
        if self.weekly_max_attempts == 0 {
            return Err("Weekly rollup needs at least one attempt".to_string());
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(format!(
                "Backoff minimum {}ms exceeds maximum {}ms",
                self.backoff_min_ms, self.backoff_max_ms
            ));
        }
        if self.schedule_interval.is_zero() {
            return Err("Schedule interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FinalizationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.time_budget, Duration::from_secs(540));
        assert_eq!(config.page_size, 100);
        assert_eq!(config.weekly_max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_page_size() {
        let config = FinalizationConfig::new().with_page_size(0);
        assert!(config.validate().unwrap_err().contains("Page size"));
    }

    #[test]
    fn test_validate_inverted_backoff() {
        let config = FinalizationConfig::new().with_backoff_ms(50, 10);
        assert!(config.validate().unwrap_err().contains("exceeds"));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let config = FinalizationConfig::new().with_weekly_max_attempts(0);
        assert!(config.validate().is_err());
    }
}
