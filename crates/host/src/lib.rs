//! Process host for atomic multi-party account transfers.
//!
//! Wires the account, ledger and cleanup pools into one `Cluster`, delivers
//! durable timer ticks, and serves a REST surface with structured logging
//! (tracing) and Prometheus metrics.

pub mod cluster;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use cluster::Cluster;
pub use config::HostConfig;
pub use error::ApiError;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(cluster: Arc<Cluster>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/accounts/{id}", get(routes::accounts::get))
        .route("/accounts/{id}/deposit", post(routes::accounts::deposit))
        .route("/accounts/{id}/spend", post(routes::accounts::spend))
        .route("/accounts/{id}/transfer", post(routes::accounts::transfer))
        .route("/transactions", post(routes::transactions::create))
        .route("/transactions/{id}", get(routes::transactions::status))
        .with_state(cluster)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
