//! Caller-side view of the ledger.

use async_trait::async_trait;
use common::TransactionId;
use runtime::CallError;

/// The ledger operations a saga participant calls.
///
/// Both operations are remote calls and may fail without telling the caller
/// whether a `set_complete` was applied. Retrying is always safe.
#[async_trait]
pub trait TransactionStatus: Send + Sync {
    /// Records `id` as complete.
    async fn set_complete(&self, id: TransactionId) -> Result<(), CallError>;

    /// Returns true if `id` is known complete.
    async fn is_complete(&self, id: TransactionId) -> Result<bool, CallError>;
}
