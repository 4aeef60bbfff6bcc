//! Error responses shared by the route handlers.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::aggregation::AggregationError;
use shared::storage::StoreError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error type.
    pub error: String,
    /// Detailed error message.
    pub message: String,
}

/// Error half of every handler's result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Builds an error tuple.
pub fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Maps a malformed JSON body to 400.
pub fn json_rejection(rejection: &JsonRejection) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        "invalid_json",
        rejection.body_text(),
    )
}

/// Maps an unparsable path segment to 400.
pub fn path_rejection(rejection: &PathRejection) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        "invalid_parameter",
        rejection.body_text(),
    )
}

/// Maps an unparsable query string to 400.
pub fn query_rejection(rejection: &QueryRejection) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        "invalid_parameter",
        rejection.body_text(),
    )
}

/// Maps a store failure to a status code.
pub fn store_error(err: &StoreError) -> ApiError {
    match err {
        StoreError::Conflict { .. } => api_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        StoreError::WrongKind { .. } | StoreError::LockError | StoreError::StorageError(_) => {
            tracing::error!(error = %err, "Aggregate store failure");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                err.to_string(),
            )
        }
    }
}

/// Maps a hot-path failure to a status code.
pub fn aggregation_error(err: &AggregationError) -> ApiError {
    match err {
        AggregationError::InvalidReading(e) => {
            api_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        AggregationError::Resample(e) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unsupported_resample",
            e.to_string(),
        ),
        AggregationError::Metric(e) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "aggregate_error",
            e.to_string(),
        ),
        AggregationError::Store(e) => store_error(e),
    }
}

/// 404 for a view that has not been written yet.
pub fn not_found(key: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("No aggregate stored under {key}"),
    )
}
