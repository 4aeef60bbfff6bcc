//! Wall-clock abstraction.
//!
//! The finalization sweep reads "now" through a [`Clock`] so that cutoffs and
//! time budgets can be driven deterministically in tests.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::RwLock;

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    step: TimeDelta,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
            step: TimeDelta::zero(),
        }
    }

    /// Makes every [`Clock::now`] call advance the clock by `step` afterwards.
    #[must_use]
    pub fn with_auto_advance(mut self, step: TimeDelta) -> Self {
        self.step = step;
        self
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        if let Ok(mut now) = self.now.write() {
            *now += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.write() {
            Ok(mut now) => {
                let current = *now;
                *now += self.step;
                current
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
