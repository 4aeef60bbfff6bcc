//! Scheduled finalization of aged daily aggregates.
//!
//! Each page of unfinalized days older than the cutoff is sealed in memory,
//! rolled up into weekly aggregates, and only then written back. If the
//! rollup fails nothing from that page is persisted, so the next run repeats
//! the same work.

use super::weekly::WeeklyRollup;
use crate::clock::Clock;
use crate::config::FinalizationConfig;
use crate::models::{Aggregate, DailyAggregate};
use crate::storage::{AggregateStore, PageCursor, WriteCondition};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationResult {
    /// False if the run stopped on a critical failure.
    pub success: bool,
    /// Days sealed and persisted.
    pub processed_count: usize,
    /// Days that could not be sealed.
    pub failed_count: usize,
    /// Days left open because a concurrent write won.
    pub skipped_count: usize,
    /// True if the run stopped because the time budget ran out.
    pub budget_exhausted: bool,
    /// Cause of a critical failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FinalizationResult {
    fn critical(mut self, message: String) -> Self {
        self.success = false;
        self.error_message = Some(message);
        self
    }
}

/// Seals aged daily aggregates and rolls them up into weeks.
#[derive(Clone)]
pub struct FinalizationSweep {
    store: Arc<dyn AggregateStore>,
    rollup: WeeklyRollup,
    clock: Arc<dyn Clock>,
    config: FinalizationConfig,
}

impl FinalizationSweep {
    /// Creates a sweep over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn AggregateStore>,
        clock: Arc<dyn Clock>,
        config: FinalizationConfig,
    ) -> Self {
        let rollup = WeeklyRollup::new(Arc::clone(&store), &config);
        Self {
            store,
            rollup,
            clock,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &FinalizationConfig {
        &self.config
    }

    /// Start of the oldest day that is still left open: UTC midnight today
    /// minus `lookback_hours`.
    #[must_use]
    pub fn cutoff(now: DateTime<Utc>, lookback_hours: u32) -> DateTime<Utc> {
        let midnight = now.duration_trunc(TimeDelta::days(1)).unwrap_or(now);
        midnight - TimeDelta::hours(i64::from(lookback_hours))
    }

    /// Runs one sweep.
    ///
    /// Stops gracefully when the store is exhausted or the time budget runs
    /// out. A failed page fetch or weekly rollup is a critical failure: the
    /// counts gathered so far are returned with `success == false`.
    pub async fn execute(&self, lookback_hours: u32) -> FinalizationResult {
        let started = self.clock.now();
        let cutoff = Self::cutoff(started, lookback_hours);
        let budget = TimeDelta::from_std(self.config.time_budget).unwrap_or(TimeDelta::MAX);
        let mut result = FinalizationResult {
            success: true,
            ..FinalizationResult::default()
        };
        let mut cursor: Option<PageCursor> = None;

        tracing::info!(%cutoff, lookback_hours, "Starting daily finalization");

        loop {
            let elapsed = self.clock.now() - started;
            if elapsed > budget {
                tracing::warn!(
                    elapsed_secs = elapsed.num_seconds(),
                    processed = result.processed_count,
                    failed = result.failed_count,
                    "Time budget exceeded, remaining days are left for the next run"
                );
                result.budget_exhausted = true;
                break;
            }

            let page = match self.store.query_unfinalized_before(
                cutoff,
                self.config.page_size,
                cursor.as_ref(),
            ) {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch unfinalized days");
                    return result.critical(format!("Failed to fetch unfinalized days: {e}"));
                }
            };

            if page.items.is_empty() {
                tracing::info!("No more unfinalized days found");
                break;
            }

            let sealed = seal_page(page.items, &mut result);
            if !sealed.is_empty() {
                if let Err(e) = self.rollup.sync_days_to_weeks(&sealed).await {
                    tracing::error!(
                        error = %e,
                        "Weekly rollup failed, aborting run without persisting the page"
                    );
                    return result.critical(format!("Weekly rollup failed: {e}"));
                }
                self.persist(sealed, &mut result);
                tracing::info!(
                    processed = result.processed_count,
                    failed = result.failed_count,
                    skipped = result.skipped_count,
                    "Finalized page"
                );
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(
            processed = result.processed_count,
            failed = result.failed_count,
            skipped = result.skipped_count,
            "Finalization completed"
        );
        result
    }

    fn persist(&self, sealed: Vec<DailyAggregate>, result: &mut FinalizationResult) {
        for day in sealed {
            let condition = WriteCondition::expecting(day.version.as_ref());
            let key = day.key.clone();
            match self.store.upsert(&Aggregate::Daily(day), condition) {
                Ok(_) => result.processed_count += 1,
                Err(e) if e.is_conflict() => {
                    tracing::warn!(
                        %key,
                        "Day changed during finalization, leaving it for the next run"
                    );
                    result.skipped_count += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, %key, "Failed to persist finalized day");
                    result.failed_count += 1;
                }
            }
        }
    }
}

fn seal_page(items: Vec<DailyAggregate>, result: &mut FinalizationResult) -> Vec<DailyAggregate> {
    items
        .into_iter()
        .filter_map(|mut day| match day.finalize() {
            Ok(()) => Some(day),
            Err(e) => {
                tracing::warn!(error = %e, key = %day.key, "Failed to finalize day, skipping");
                result.failed_count += 1;
                None
            }
        })
        .collect()
}
