//! Weather Worker
//!
//! This crate provides the HTTP shell around the weather station aggregation
//! core. It accepts readings, serves the stored views and runs the
//! finalization sweep both on demand and on a schedule.
//!
//! # Architecture
//!
//! The worker is built on Axum and Tokio, providing:
//! - `POST /api/v1/readings` feeding the hot path
//! - Read-only routes for latest, hourly, daily and weekly views
//! - `POST /api/v1/finalization/run` and a background finalizer for the cold path
//!
//! # Example
//!
//! ```no_run
//! use api::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod routes;
mod scheduler;
mod state;

pub use config::{Config, LogFormat};
pub use routes::{DailyRangeResponse, ErrorResponse};
pub use scheduler::FinalizerScheduler;
pub use state::AppState;

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Runs the weather worker.
///
/// Loads configuration from environment variables, starts the scheduled
/// finalizer if enabled and serves HTTP until SIGTERM/SIGINT.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    run_server_with_config(config).await
}

/// Runs the weather worker with the provided configuration.
///
/// # Errors
///
/// Returns an error if:
/// - The configured address is invalid or cannot be bound
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Weather worker starting"
    );

    let state = AppState::with_config(&config);

    let finalizer = if config.finalization.enabled {
        let scheduler = Arc::new(FinalizerScheduler::new(state.finalization().clone()));
        Some(tokio::spawn(scheduler.run()))
    } else {
        tracing::info!("Scheduled finalizer disabled");
        None
    };

    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = finalizer {
        handle.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::readings_routes(state.clone()))
        .merge(routes::views_routes(state.clone()))
        .merge(routes::finalization_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
