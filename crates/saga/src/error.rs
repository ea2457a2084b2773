//! Saga error types.

use common::{EntityId, TransactionId};
use runtime::CallError;
use thiserror::Error;

/// Errors that can occur building or executing a saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A transaction needs at least two participants.
    #[error("A transaction needs at least two participants, got {0}")]
    TooFewParticipants(usize),

    /// The same participant was added twice.
    #[error("Participant {0} was added twice")]
    DuplicateParticipant(EntityId),

    /// The retry window for this transaction id has passed.
    #[error("Transaction {0} has expired and cannot be retried")]
    Expired(TransactionId),

    /// The outcome could not be determined yet. Retrying is safe.
    #[error("Outcome of transaction {0} is not known yet")]
    OutcomePending(TransactionId),

    /// A call to the ledger failed.
    #[error("Call failed: {0}")]
    Call(#[from] CallError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
