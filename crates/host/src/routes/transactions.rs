//! Multi-party transaction endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{EntityId, TransactionId};
use domain::WalletDelta;
use ledger::TransactionStatus;
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::ApiError;
use crate::routes::parse_transaction_id;

#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    pub account: EntityId,
    #[serde(default)]
    pub currency: i64,
    #[serde(default)]
    pub goods: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub participants: Vec<ParticipantRequest>,
    /// Set to retry an earlier submission.
    pub transaction_id: Option<TransactionId>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Absent when fewer than two participants were given.
    pub transaction_id: Option<TransactionId>,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionStatusResponse {
    pub transaction_id: TransactionId,
    pub complete: bool,
}

/// POST /transactions: run a saga across every participant.
///
/// Returns 202 with the transaction id when the outcome is not known yet;
/// posting again with that id is safe.
#[tracing::instrument(skip(cluster, req), fields(participants = req.participants.len()))]
pub async fn create(
    State(cluster): State<Arc<Cluster>>,
    Json(req): Json<TransactionRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let mut builder = cluster.builder();
    if let Some(id) = req.transaction_id {
        builder = builder.with_transaction_id(id);
    }
    for participant in req.participants {
        builder.add(
            participant.account,
            WalletDelta::new(participant.currency, participant.goods),
        )?;
    }

    let success = builder
        .execute(&*cluster.accounts, &*cluster.ledger)
        .await?;

    Ok(Json(TransactionResponse {
        transaction_id: builder.transaction_id().filter(|_| builder.len() >= 2),
        success,
    }))
}

/// GET /transactions/{id}: whether the ledger records the transaction as
/// complete.
#[tracing::instrument(skip(cluster))]
pub async fn status(
    State(cluster): State<Arc<Cluster>>,
    Path(id): Path<String>,
) -> Result<Json<TransactionStatusResponse>, ApiError> {
    let transaction_id = parse_transaction_id(&id)?;
    let complete = cluster.ledger.is_complete(transaction_id).await?;
    Ok(Json(TransactionStatusResponse {
        transaction_id,
        complete,
    }))
}
