use std::sync::Arc;

use async_trait::async_trait;
use runtime::CallError;

use crate::transaction::SagaTransaction;

/// Delivers a saga hop to a participant.
///
/// `transact` runs participant `index` of `transaction`, which commits
/// locally and forwards to `index + 1`. An `Err` means the outcome is
/// unknown to the caller, never that the hop failed.
#[async_trait]
pub trait TransactionParticipants<D>: Send + Sync
where
    D: Send + Sync + 'static,
{
    async fn transact(
        &self,
        transaction: Arc<SagaTransaction<D>>,
        index: usize,
    ) -> Result<bool, CallError>;
}
