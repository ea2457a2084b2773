//! Ledger error types.

use runtime::TimerError;
use state_store::StorageError;
use thiserror::Error;

/// Errors raised by a ledger shard.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The shard's state could not be loaded or persisted.
    #[error("Ledger storage error: {0}")]
    Storage(#[from] StorageError),

    /// The rotation timer could not be registered.
    #[error("Ledger timer error: {0}")]
    Timer(#[from] TimerError),
}

impl LedgerError {
    /// Returns true if the shard's storage generation was superseded.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_conflict())
    }
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;
