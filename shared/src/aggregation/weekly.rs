//! Weekly rollup of sealed days.
//!
//! Sealed days are grouped by device and ISO week. Groups are written
//! concurrently; within a group a conditional write that loses to another
//! writer is retried from a fresh read after a short random pause.

use crate::config::FinalizationConfig;
use crate::models::{Aggregate, ApplyDayError, DailyAggregate, WeeklyAggregate};
use crate::storage::{AggregateStore, AggregateStoreExt, StoreError, WriteCondition};
use crate::view_id::{IsoWeek, ViewId};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

/// Errors raised by the weekly rollup. All of them fail the whole run.
#[derive(Debug, Error)]
pub enum RollupError {
    /// A week kept losing conditional writes.
    #[error(
        "Failed to update week {iso_year}-W{iso_week:02} for {device_id} after {attempts} attempts"
    )]
    RetriesExhausted {
        /// Device of the contested week.
        device_id: String,
        /// ISO year.
        iso_year: i32,
        /// ISO week.
        iso_week: u32,
        /// Attempts made.
        attempts: u32,
    },

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A day could not be folded into its week.
    #[error(transparent)]
    Day(#[from] ApplyDayError),

    /// A group task panicked or was cancelled.
    #[error("Weekly rollup task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    backoff_min_ms: u64,
    backoff_max_ms: u64,
}

impl RetryPolicy {
    fn backoff(self) -> Duration {
        let ms = rand::rng().random_range(self.backoff_min_ms..=self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Folds sealed daily aggregates into their weekly aggregates.
#[derive(Clone)]
pub struct WeeklyRollup {
    store: Arc<dyn AggregateStore>,
    policy: RetryPolicy,
}

impl WeeklyRollup {
    /// Creates a rollup over `store` using the retry settings of `config`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, config: &FinalizationConfig) -> Self {
        Self {
            store,
            policy: RetryPolicy {
                max_attempts: config.weekly_max_attempts.max(1),
                backoff_min_ms: config.backoff_min_ms.min(config.backoff_max_ms),
                backoff_max_ms: config.backoff_max_ms,
            },
        }
    }

    /// Writes every sealed day into its week and returns the weekly keys
    /// written.
    ///
    /// All groups run to completion; the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if any group exhausts its attempts, a day cannot be
    /// applied, or the store fails.
    pub async fn sync_days_to_weeks(
        &self,
        sealed_days: &[DailyAggregate],
    ) -> Result<Vec<String>, RollupError> {
        let mut groups: BTreeMap<(String, IsoWeek), Vec<DailyAggregate>> = BTreeMap::new();
        for day in sealed_days {
            groups
                .entry((day.device_id.clone(), IsoWeek::of(&day.day_start)))
                .or_default()
                .push(day.clone());
        }

        let mut tasks = JoinSet::new();
        for ((device_id, week), days) in groups {
            let store = Arc::clone(&self.store);
            let policy = self.policy;
            tasks.spawn(async move {
                sync_week(store.as_ref(), &device_id, week, &days, policy).await
            });
        }

        let mut written = Vec::new();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(key)) => written.push(key),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(RollupError::TaskFailed(e.to_string()));
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        written.sort();
        Ok(written)
    }
}

async fn sync_week(
    store: &dyn AggregateStore,
    device_id: &str,
    week: IsoWeek,
    days: &[DailyAggregate],
    policy: RetryPolicy,
) -> Result<String, RollupError> {
    let key = ViewId::for_week(device_id, week).key;

    for attempt in 1..=policy.max_attempts {
        let mut weekly = store
            .get_view::<WeeklyAggregate>(&key)?
            .unwrap_or_else(|| WeeklyAggregate::new(device_id, week));
        for day in days {
            weekly.apply_day(day)?;
        }

        let condition = WriteCondition::expecting(weekly.version.as_ref());
        match store.upsert(&Aggregate::Weekly(weekly), condition) {
            Ok(_) => {
                tracing::debug!(%key, days = days.len(), "Updated weekly aggregate");
                return Ok(key);
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(
                    %device_id,
                    %week,
                    attempt,
                    "Concurrency conflict on weekly aggregate"
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.backoff()).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %device_id, %week, "Fatal error processing week");
                return Err(e.into());
            }
        }
    }

    Err(RollupError::RetriesExhausted {
        device_id: device_id.to_string(),
        iso_year: week.year,
        iso_week: week.week,
        attempts: policy.max_attempts,
    })
}
