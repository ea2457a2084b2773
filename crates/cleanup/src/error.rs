//! Cleanup error types.

use runtime::TimerError;
use state_store::StorageError;
use thiserror::Error;

/// Errors raised by a cleanup agent.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Cleanup storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cleanup timer error: {0}")]
    Timer(#[from] TimerError),
}

impl CleanupError {
    /// Returns true if the agent's storage generation was superseded.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CleanupError::Storage(e) if e.is_conflict())
    }
}

/// Convenience type alias for cleanup results.
pub type Result<T> = std::result::Result<T, CleanupError>;
