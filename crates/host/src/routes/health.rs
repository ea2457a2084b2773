//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::cluster::Cluster;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_accounts: usize,
    pub active_ledger_shards: usize,
    pub timers: usize,
}

/// GET /health: returns host status and live activation counts.
pub async fn check(State(cluster): State<Arc<Cluster>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_accounts: cluster.accounts.active_accounts().len(),
        active_ledger_shards: cluster.ledger.active_shards().len(),
        timers: cluster.timers.len(),
    })
}
