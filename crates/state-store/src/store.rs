use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{EntityAddress, Result, StoredState, Version};

/// Core trait for state store implementations.
///
/// A state store holds exactly one state blob per entity address. Writes are
/// guarded by an expected version: a write against a stale version fails with
/// `ConcurrencyConflict` and never overwrites the newer blob.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the current state of an entity.
    ///
    /// Returns None if nothing was ever written (or it was cleared).
    async fn read_state(&self, address: &EntityAddress) -> Result<Option<StoredState>>;

    /// Writes the state of an entity.
    ///
    /// `expected` must equal the version currently stored (`Version::initial()`
    /// when nothing is stored). Returns the new version.
    async fn write_state(
        &self,
        address: &EntityAddress,
        state: serde_json::Value,
        expected: Version,
    ) -> Result<Version>;

    /// Removes the state of an entity, guarded by the expected version.
    async fn clear_state(&self, address: &EntityAddress, expected: Version) -> Result<()>;
}

/// Extension trait providing typed convenience methods for state stores.
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Reads and deserializes an entity's state along with its version.
    ///
    /// Returns `(Version::initial(), None)` when nothing is stored.
    async fn load<T: DeserializeOwned + Send>(
        &self,
        address: &EntityAddress,
    ) -> Result<(Version, Option<T>)> {
        match self.read_state(address).await? {
            Some(stored) => {
                let version = stored.version;
                Ok((version, Some(stored.into_state()?)))
            }
            None => Ok((Version::initial(), None)),
        }
    }

    /// Serializes and writes an entity's state.
    async fn save<T: Serialize + Sync>(
        &self,
        address: &EntityAddress,
        state: &T,
        expected: Version,
    ) -> Result<Version> {
        let value = serde_json::to_value(state)?;
        self.write_state(address, value, expected).await
    }
}

// Blanket implementation for all StateStore implementations
impl<T: StateStore + ?Sized> StateStoreExt for T {}
