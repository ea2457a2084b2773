//! Account endpoints: holdings, local changes and pairwise transfers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{EntityId, TransactionId};
use domain::{Wallet, WalletDelta};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::error::ApiError;
use crate::routes::parse_entity_id;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AmountsRequest {
    #[serde(default)]
    pub currency: i64,
    #[serde(default)]
    pub goods: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub target: EntityId,
    #[serde(default)]
    pub currency: i64,
    #[serde(default)]
    pub goods: i64,
    pub transaction_id: Option<TransactionId>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct HoldingsResponse {
    pub id: EntityId,
    pub currency: i64,
    pub goods: i64,
}

impl HoldingsResponse {
    fn new(id: EntityId, wallet: Wallet) -> Self {
        Self {
            id,
            currency: wallet.currency,
            goods: wallet.goods,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpendResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub transaction_id: TransactionId,
    pub success: bool,
}

// -- Handlers --

/// GET /accounts/{id}: current holdings.
#[tracing::instrument(skip(cluster))]
pub async fn get(
    State(cluster): State<Arc<Cluster>>,
    Path(id): Path<String>,
) -> Result<Json<HoldingsResponse>, ApiError> {
    let id = parse_entity_id(&id)?;
    let wallet = cluster.accounts.holdings(id).await?;
    Ok(Json(HoldingsResponse::new(id, wallet)))
}

/// POST /accounts/{id}/deposit: add currency and goods. Amounts of zero or
/// less are ignored.
#[tracing::instrument(skip(cluster))]
pub async fn deposit(
    State(cluster): State<Arc<Cluster>>,
    Path(id): Path<String>,
    Json(req): Json<AmountsRequest>,
) -> Result<Json<HoldingsResponse>, ApiError> {
    let id = parse_entity_id(&id)?;
    let wallet = cluster
        .accounts
        .request(id, move |account, _| async move {
            account.add_currency(req.currency).await?;
            account.add_goods(req.goods).await?;
            Ok(account.holdings().await)
        })
        .await?;
    Ok(Json(HoldingsResponse::new(id, wallet)))
}

/// POST /accounts/{id}/spend: remove currency and goods together, or
/// nothing if either is insufficient.
#[tracing::instrument(skip(cluster))]
pub async fn spend(
    State(cluster): State<Arc<Cluster>>,
    Path(id): Path<String>,
    Json(req): Json<AmountsRequest>,
) -> Result<Json<SpendResponse>, ApiError> {
    let id = parse_entity_id(&id)?;
    if req.currency < 0 || req.goods < 0 {
        return Err(ApiError::BadRequest(
            "Spend amounts must not be negative".to_string(),
        ));
    }

    let success = match (req.currency, req.goods) {
        (0, 0) => false,
        (currency, 0) => {
            cluster
                .accounts
                .request(id, move |account, _| async move {
                    account.spend_currency(currency).await
                })
                .await?
        }
        (0, goods) => {
            cluster
                .accounts
                .request(id, move |account, _| async move { account.spend_goods(goods).await })
                .await?
        }
        (currency, goods) => {
            cluster
                .accounts
                .apply(id, WalletDelta::new(-currency, -goods))
                .await?
        }
    };
    Ok(Json(SpendResponse { success }))
}

/// POST /accounts/{id}/transfer: pairwise transfer to `target`. The target
/// receives the given amounts; negative amounts flow back to the sender.
#[tracing::instrument(skip(cluster))]
pub async fn transfer(
    State(cluster): State<Arc<Cluster>>,
    Path(id): Path<String>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let from = parse_entity_id(&id)?;
    let transaction_id = req.transaction_id.unwrap_or_default();

    let success = cluster
        .accounts
        .initiate(
            from,
            req.target,
            transaction_id,
            WalletDelta::new(req.currency, req.goods),
        )
        .await?;

    Ok(Json(TransferResponse {
        transaction_id,
        success,
    }))
}
