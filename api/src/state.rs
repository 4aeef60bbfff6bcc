//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use crate::config::Config;
use shared::aggregation::{AggregationService, FinalizationSweep};
use shared::clock::{Clock, SystemClock};
use shared::storage::{AggregateStore, InMemoryAggregateStore};
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// Holds the aggregate store and the two services built on top of it.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn AggregateStore>,
    aggregation: AggregationService,
    finalization: FinalizationSweep,
}

impl AppState {
    /// Creates a new application state over `store`.
    pub fn new(store: Arc<dyn AggregateStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let aggregation = AggregationService::new(Arc::clone(&store), config.aggregation.clone());
        let finalization =
            FinalizationSweep::new(Arc::clone(&store), clock, config.finalization.clone());
        Self {
            store,
            aggregation,
            finalization,
        }
    }

    /// Creates a new application state with an in-memory store and default
    /// configuration.
    ///
    /// This is useful for development and testing.
    #[must_use]
    pub fn with_in_memory_store() -> Self {
        Self::with_config(&Config::default())
    }

    /// Creates an in-memory application state using `config`.
    #[must_use]
    pub fn with_config(config: &Config) -> Self {
        Self::new(
            InMemoryAggregateStore::new_shared(),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Returns a reference to the aggregate store.
    #[must_use]
    pub fn store(&self) -> &dyn AggregateStore {
        self.store.as_ref()
    }

    /// Returns the hot-path service.
    #[must_use]
    pub const fn aggregation(&self) -> &AggregationService {
        &self.aggregation
    }

    /// Returns the finalization sweep.
    #[must_use]
    pub const fn finalization(&self) -> &FinalizationSweep {
        &self.finalization
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_in_memory_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::chrono::{TimeZone, Utc};
    use shared::models::Reading;
    use shared::storage::AggregateStoreExt;
    use shared::models::DailyAggregate;

    #[test]
    fn test_app_state_is_clone_and_shares_store() {
        let state = AppState::with_in_memory_store();
        let state2 = state.clone();
        let reading = Reading::new("dev", Utc.with_ymd_and_hms(2025, 9, 11, 8, 0, 0).unwrap())
            .with_pressure(1012.0);

        state.aggregation().apply_reading(&reading).unwrap();

        let day: Option<DailyAggregate> = state2.store().get_view("dev|daily|2025-09-11").unwrap();
        assert!(day.is_some());
    }
}
