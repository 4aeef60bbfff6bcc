//! Weather Station Shared Library
//!
//! This crate contains the aggregation core of the weather station worker:
//! rain histogram resampling, the metric aggregate, view keys, the aggregate
//! store contract and the hot and cold aggregation paths.
//!
//! # Modules
//!
//! - [`models`] - Readings, histograms, metric aggregates and stored views
//! - [`resampler`] - Rain histogram resampling and merging
//! - [`view_id`] - Storage keys for latest, hourly, daily, weekly and monthly views
//! - [`storage`] - Storage traits and implementations
//! - [`aggregation`] - Hot-path updates, weekly rollup and finalization sweep
//! - [`config`] - Aggregation and finalization settings
//! - [`clock`] - Wall-clock abstraction
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shared::aggregation::AggregationService;
//! use shared::chrono::{TimeZone, Utc};
//! use shared::config::AggregationConfig;
//! use shared::models::{RainHistogram, Reading};
//! use shared::storage::InMemoryAggregateStore;
//!
//! let store = InMemoryAggregateStore::new_shared();
//! let service = AggregationService::new(store, AggregationConfig::default());
//!
//! let start = Utc.with_ymd_and_hms(2025, 8, 14, 15, 18, 0).unwrap();
//! let reading = Reading::new("station-1", Utc.with_ymd_and_hms(2025, 8, 14, 15, 30, 0).unwrap())
//!     .with_temperature(21.5)
//!     .with_rain(RainHistogram::from_counts(&[1, 0, 2], 120, start, 0.2));
//!
//! let outcome = service.apply_reading(&reading).unwrap();
//! assert_eq!(outcome.daily.updated, vec!["station-1|daily|2025-08-14"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregation;
pub mod clock;
pub mod config;
pub mod models;
pub mod resampler;
pub mod storage;
pub mod view_id;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
