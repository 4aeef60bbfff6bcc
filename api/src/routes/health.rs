//! Health check endpoint.
//!
//! Reports liveness plus the worker settings a probe usually wants to see.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (always "healthy" if reachable).
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Whether the scheduled finalizer is enabled.
    pub finalizer_enabled: bool,
    /// Bucket widths the hot path resamples rain to.
    pub bucket_seconds: Vec<u32>,
}

/// Creates the health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "weather-worker",
        version: env!("CARGO_PKG_VERSION"),
        finalizer_enabled: state.finalization().config().enabled,
        bucket_seconds: state.aggregation().config().bucket_widths().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_reports_service_and_buckets() {
        let app = health_routes(AppState::with_in_memory_store());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "weather-worker");
        assert_eq!(health["finalizer_enabled"], true);
        assert_eq!(health["bucket_seconds"], serde_json::json!([300, 300, 3600]));
    }
}
