//! Aggregate view lookup endpoints.
//!
//! Read-only access to the views written by the hot path and the
//! finalization sweep. Keys are derived with [`ViewId`], so the same UTC
//! rules apply to lookups as to writes.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use shared::models::{DailyAggregate, HourlyAggregate, LatestSnapshot, View, WeeklyAggregate};
use shared::storage::AggregateStoreExt;
use shared::view_id::{IsoWeek, ViewId};

use super::error::{
    api_error, not_found, path_rejection, query_rejection, store_error, ApiError,
};
use crate::state::AppState;

/// Longest daily range served by a single request, in days.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Query parameters for a daily range lookup.
#[derive(Debug, Deserialize)]
pub struct DailyRangeQuery {
    /// First day, inclusive.
    pub from: NaiveDate,
    /// Last day, inclusive.
    pub to: NaiveDate,
}

/// Response for a daily range lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct DailyRangeResponse {
    /// Stored days in ascending order. Days without data are omitted.
    pub days: Vec<DailyAggregate>,
    /// Number of days returned.
    pub count: usize,
}

/// Creates the view lookup routes.
///
/// # Routes
///
/// - `GET /api/v1/devices/{device_id}/latest` - Rolling latest snapshot
/// - `GET /api/v1/devices/{device_id}/hourly/{hour}` - Hour as `YYYY-MM-DDTHH`
/// - `GET /api/v1/devices/{device_id}/daily/{date}` - Day as `YYYY-MM-DD`
/// - `GET /api/v1/devices/{device_id}/daily?from=&to=` - Inclusive day range
/// - `GET /api/v1/devices/{device_id}/weekly/{year}/{week}` - ISO week
pub fn views_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/devices/{device_id}/latest", get(get_latest))
        .route("/api/v1/devices/{device_id}/hourly/{hour}", get(get_hourly))
        .route("/api/v1/devices/{device_id}/daily", get(get_daily_range))
        .route("/api/v1/devices/{device_id}/daily/{date}", get(get_daily))
        .route(
            "/api/v1/devices/{device_id}/weekly/{year}/{week}",
            get(get_weekly),
        )
        .with_state(state)
}

fn load<V: View>(state: &AppState, key: &str) -> Result<Json<V>, ApiError> {
    state
        .store()
        .get_view::<V>(key)
        .map_err(|e| store_error(&e))?
        .map(Json)
        .ok_or_else(|| not_found(key))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "invalid_parameter", message)
}

fn parse_day(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| bad_request(format!("Invalid date '{raw}': {e}")))
}

async fn get_latest(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<LatestSnapshot>, ApiError> {
    load(&state, &ViewId::latest(&device_id).key)
}

async fn get_hourly(
    State(state): State<AppState>,
    Path((device_id, hour)): Path<(String, String)>,
) -> Result<Json<HourlyAggregate>, ApiError> {
    let start = NaiveDateTime::parse_from_str(&format!("{hour}:00"), "%Y-%m-%dT%H:%M")
        .map_err(|e| bad_request(format!("Invalid hour '{hour}': {e}")))?
        .and_utc();
    load(&state, &ViewId::hourly(&device_id, &start).key)
}

async fn get_daily(
    State(state): State<AppState>,
    Path((device_id, date)): Path<(String, String)>,
) -> Result<Json<DailyAggregate>, ApiError> {
    let day = parse_day(&date)?.and_time(NaiveTime::MIN).and_utc();
    load(&state, &ViewId::daily(&device_id, &day).key)
}

/// Handler for GET /api/v1/devices/{device_id}/daily?from=&to=.
///
/// Returns 400 when either bound is not a date, `from` is after `to` or the
/// range is longer than [`MAX_RANGE_DAYS`].
async fn get_daily_range(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<DailyRangeQuery>, QueryRejection>,
) -> Result<Json<DailyRangeResponse>, ApiError> {
    let Path(device_id) = path.map_err(|e| path_rejection(&e))?;
    let Query(range) = query.map_err(|e| query_rejection(&e))?;
    if range.from > range.to {
        return Err(bad_request("'from' must not be after 'to'"));
    }
    let span = (range.to - range.from).num_days() + 1;
    if span > MAX_RANGE_DAYS {
        return Err(bad_request(format!(
            "Range of {span} days exceeds the limit of {MAX_RANGE_DAYS}"
        )));
    }

    let keys: Vec<String> = range
        .from
        .iter_days()
        .take_while(|day| *day <= range.to)
        .map(|day| ViewId::daily(&device_id, &day.and_time(NaiveTime::MIN).and_utc()).key)
        .collect();

    let days: Vec<DailyAggregate> = state
        .store()
        .read_many(&keys)
        .map_err(|e| store_error(&e))?
        .into_iter()
        .filter_map(|aggregate| DailyAggregate::from_aggregate(aggregate).ok())
        .collect();

    tracing::debug!(
        device_id = %device_id,
        requested = keys.len(),
        found = days.len(),
        "Daily range lookup"
    );

    Ok(Json(DailyRangeResponse {
        count: days.len(),
        days,
    }))
}

async fn get_weekly(
    State(state): State<AppState>,
    path: Result<Path<(String, i32, u32)>, PathRejection>,
) -> Result<Json<WeeklyAggregate>, ApiError> {
    let Path((device_id, year, week)) = path.map_err(|e| path_rejection(&e))?;
    let week = IsoWeek::new(year, week)
        .ok_or_else(|| bad_request(format!("{year}-W{week:02} is not an ISO week")))?;
    load(&state, &ViewId::for_week(&device_id, week).key)
}
