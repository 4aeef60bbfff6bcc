//! Finalization trigger endpoint.
//!
//! Runs one finalization sweep on demand. The scheduled finalizer calls the
//! same sweep, so a manual run and a scheduled run are interchangeable.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use shared::aggregation::FinalizationResult;

use super::error::{query_rejection, ApiError};
use crate::state::AppState;

/// Query parameters for a manual sweep.
#[derive(Debug, Default, Deserialize)]
pub struct FinalizationQuery {
    /// Hours before today's UTC midnight that stay open. Defaults to the
    /// configured lookback.
    pub lookback_hours: Option<u32>,
}

/// Creates the finalization routes.
///
/// # Routes
///
/// - `POST /api/v1/finalization/run` - Run one sweep and report its totals
pub fn finalization_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/finalization/run", post(run_finalization))
        .with_state(state)
}

/// Handler for POST /api/v1/finalization/run.
///
/// Returns 200 when the sweep completed (possibly with per-day failures or
/// an exhausted budget) and 500 when it stopped on a critical failure. The
/// body is the sweep result in both cases. An unparsable query is a 400.
async fn run_finalization(
    State(state): State<AppState>,
    query: Result<Query<FinalizationQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<FinalizationResult>), ApiError> {
    let Query(query) = query.map_err(|e| query_rejection(&e))?;
    let sweep = state.finalization();
    let lookback_hours = query
        .lookback_hours
        .unwrap_or(sweep.config().lookback_hours);

    tracing::info!(lookback_hours, "Manual finalization requested");
    let result = sweep.execute(lookback_hours).await;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use shared::chrono::{TimeZone, Utc};
    use shared::clock::FixedClock;
    use shared::models::Reading;
    use shared::storage::InMemoryAggregateStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 9, 13, 6, 0, 0).unwrap());
        AppState::new(
            InMemoryAggregateStore::new_shared(),
            Arc::new(clock),
            &Config::default(),
        )
    }

    fn record(state: &AppState, timestamp: &str) {
        let reading: Reading = serde_json::from_value(serde_json::json!({
            "device_id": "station-1",
            "source_id": timestamp,
            "timestamp": timestamp,
            "temperature": 20.0
        }))
        .unwrap();
        state.aggregation().apply_reading(&reading).unwrap();
    }

    async fn run(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = finalization_routes(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_empty_store_reports_nothing_processed() {
        let (status, result) = run(state(), "/api/v1/finalization/run").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], true);
        assert_eq!(result["processed_count"], 0);
        assert_eq!(result["budget_exhausted"], false);
    }

    #[tokio::test]
    async fn test_lookback_defaults_to_config_and_can_be_overridden() {
        let state = state();
        record(&state, "2025-09-12T12:00:00Z");

        let (_, result) = run(state.clone(), "/api/v1/finalization/run").await;
        assert_eq!(result["processed_count"], 0);

        let (status, result) = run(state, "/api/v1/finalization/run?lookback_hours=0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["processed_count"], 1);
    }

    #[tokio::test]
    async fn test_unparsable_lookback_returns_400() {
        let (status, body) = run(state(), "/api/v1/finalization/run?lookback_hours=soon").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");
    }
}
