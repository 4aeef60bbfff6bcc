//! Scheduled finalizer.
//!
//! Runs the finalization sweep on a fixed interval in the background.

use shared::aggregation::{FinalizationResult, FinalizationSweep};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Background task driving [`FinalizationSweep`] on a timer.
pub struct FinalizerScheduler {
    sweep: FinalizationSweep,
    period: Duration,
}

impl FinalizerScheduler {
    /// Creates a scheduler using the sweep's configured interval.
    #[must_use]
    pub fn new(sweep: FinalizationSweep) -> Self {
        let period = sweep.config().schedule_interval;
        Self { sweep, period }
    }

    /// Overrides the interval between sweeps.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Runs a single sweep with the configured lookback and logs the totals.
    pub async fn run_once(&self) -> FinalizationResult {
        let result = self
            .sweep
            .execute(self.sweep.config().lookback_hours)
            .await;

        if result.success {
            tracing::info!(
                processed = result.processed_count,
                failed = result.failed_count,
                skipped = result.skipped_count,
                budget_exhausted = result.budget_exhausted,
                "Scheduled finalization finished"
            );
        } else {
            tracing::error!(
                processed = result.processed_count,
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "Scheduled finalization failed"
            );
        }
        result
    }

    /// Starts the scheduling loop.
    ///
    /// The first sweep runs one period after start. Missed ticks are skipped
    /// rather than replayed.
    ///
    /// # Cancellation
    ///
    /// This function runs until cancelled via the task handle.
    pub async fn run(self: Arc<Self>) {
        let mut tick = interval_at(Instant::now() + self.period, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(period_secs = self.period.as_secs(), "Finalizer scheduled");

        loop {
            tick.tick().await;
            self.run_once().await;
        }
    }
}
