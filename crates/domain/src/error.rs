//! Account error types.

use common::TransactionId;
use runtime::{CallError, TimerError};
use state_store::StorageError;
use thiserror::Error;

/// Errors that can occur during account operations.
///
/// Validation failures are not errors; they come back as `Ok(false)`.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Loading or persisting the account failed. The activation is dropped
    /// and the next call reloads from storage.
    #[error("Account storage error: {0}")]
    Storage(#[from] StorageError),

    /// The recovery timer could not be registered or cancelled.
    #[error("Account timer error: {0}")]
    Timer(#[from] TimerError),

    /// The transfer or transaction was applied here but its outcome is not
    /// known yet. Retrying with the same id is safe.
    #[error("Outcome of transaction {0} is not known yet")]
    OutcomePending(TransactionId),

    /// The account could not be reached.
    #[error("Call failed: {0}")]
    Call(#[from] CallError),
}

impl AccountError {
    /// Returns true if the in-memory state may have diverged from storage.
    pub fn is_storage(&self) -> bool {
        matches!(self, AccountError::Storage(_))
    }
}

/// Convenience type alias for account results.
pub type Result<T> = std::result::Result<T, AccountError>;
