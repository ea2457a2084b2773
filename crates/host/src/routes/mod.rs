pub mod accounts;
pub mod health;
pub mod metrics;
pub mod transactions;

use common::{EntityId, TransactionId};

use crate::error::ApiError;

pub(crate) fn parse_entity_id(raw: &str) -> Result<EntityId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid account id: {e}")))
}

pub(crate) fn parse_transaction_id(raw: &str) -> Result<TransactionId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid transaction id: {e}")))
}
