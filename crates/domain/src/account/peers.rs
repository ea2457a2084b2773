use async_trait::async_trait;
use common::{EntityId, TransactionId};
use runtime::CallError;
use saga::TransactionParticipants;

use crate::holdings::Holdings;

/// How an account reaches other accounts.
///
/// Every method is a remote call: an `Err` says nothing about whether the
/// target applied it.
#[async_trait]
pub trait AccountPeers<H: Holdings>: TransactionParticipants<H::Delta> {
    /// Delivers a pairwise transfer to `target`.
    async fn receive(
        &self,
        target: EntityId,
        transaction_id: TransactionId,
        delta: H::Delta,
    ) -> Result<bool, CallError>;
}
