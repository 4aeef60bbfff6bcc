//! API route definitions.
//!
//! This module organizes all HTTP routes for the weather worker.

mod error;
mod finalization;
mod health;
mod readings;
mod views;

pub use error::ErrorResponse;
pub use finalization::finalization_routes;
pub use health::health_routes;
pub use readings::readings_routes;
pub use views::{views_routes, DailyRangeResponse};
