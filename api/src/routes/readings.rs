//! Reading ingestion endpoint.
//!
//! The HTTP trigger for the hot path: each accepted reading updates the
//! latest snapshot and its hourly and daily views.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use shared::aggregation::ApplyOutcome;
use shared::models::Reading;

use super::error::{aggregation_error, json_rejection, ApiError};
use crate::state::AppState;

/// Creates the reading ingestion routes.
///
/// # Routes
///
/// - `POST /api/v1/readings` - Apply one reading to the aggregate views
pub fn readings_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/readings", post(ingest_reading))
        .with_state(state)
}

/// Handler for POST /api/v1/readings.
///
/// Returns 200 with the per-view outcome, 400 for malformed or invalid
/// readings, 422 when the rain histogram cannot be resampled and 409 when
/// a window stayed contended past the retry budget.
async fn ingest_reading(
    State(state): State<AppState>,
    payload: Result<Json<Reading>, JsonRejection>,
) -> Result<Json<ApplyOutcome>, ApiError> {
    let Json(reading) = payload.map_err(|rejection| json_rejection(&rejection))?;

    state
        .aggregation()
        .apply_reading(&reading)
        .map(Json)
        .map_err(|e| {
            tracing::warn!(
                device_id = %reading.device_id,
                error = %e,
                "Rejected reading"
            );
            aggregation_error(&e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    async fn post(state: AppState, body: String) -> (StatusCode, serde_json::Value) {
        let response = readings_routes(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/readings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_accepted_reading_reports_outcome() {
        let state = AppState::with_in_memory_store();
        let reading = json!({
            "device_id": "station-1",
            "source_id": "evt-1",
            "timestamp": "2025-09-10T08:30:00Z",
            "humidity": 55.0
        });

        let (status, body) = post(state.clone(), reading.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source_id"], "evt-1");
        assert_eq!(body["daily"]["updated"], json!(["station-1|daily|2025-09-10"]));
        assert!(state.store().get("station-1|latest").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_body_returns_invalid_json() {
        let (status, body) = post(AppState::with_in_memory_store(), "[1, 2".to_string()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_json");
    }

    #[tokio::test]
    async fn test_coarse_rain_histogram_is_unprocessable() {
        let reading = json!({
            "device_id": "station-1",
            "timestamp": "2025-08-14T15:30:00Z",
            "rain": {
                "unit_counts": { "0": 2 },
                "interval_seconds": 900,
                "start_time": "2025-08-14T15:00:00Z",
                "value_per_unit": 0.2
            }
        });

        let (status, body) = post(AppState::with_in_memory_store(), reading.to_string()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "unsupported_resample");
    }
}
