use thiserror::Error;

use crate::{EntityAddress, Version};

/// Errors that can occur when interacting with the state store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The stored generation moved on since the entity last loaded or wrote.
    /// The entity must reload and re-evaluate before writing again.
    #[error(
        "Concurrency conflict for {address}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        address: EntityAddress,
        expected: Version,
        actual: Version,
    },

    /// The storage backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Returns true if this error means the caller's view of the state is stale.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrencyConflict { .. })
    }
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StorageError>;
