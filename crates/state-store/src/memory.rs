use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{EntityAddress, Result, StateStore, StorageError, StoredState, Version};

/// In-memory state store implementation.
///
/// Clones share the same underlying map, so a store handed to a host outlives
/// every activation that reads from it. Also exposes hooks for tests: an
/// outage switch, a write counter, and `supersede` to simulate another writer.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<EntityAddress, StoredState>>>,
    writes: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStateStore {
    /// Creates a new empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successful writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of stored entities.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    /// Makes every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Bumps the stored version of an entity without changing its blob, as if
    /// another activation had written it. Returns the new version.
    pub async fn supersede(&self, address: &EntityAddress) -> Option<Version> {
        let mut states = self.states.write().await;
        let stored = states.get_mut(address)?;
        stored.version = stored.version.next();
        Some(stored.version)
    }

    /// Clears all stored state.
    pub async fn clear(&self) {
        self.states.write().await.clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn read_state(&self, address: &EntityAddress) -> Result<Option<StoredState>> {
        self.check_available()?;
        let states = self.states.read().await;
        Ok(states.get(address).cloned())
    }

    async fn write_state(
        &self,
        address: &EntityAddress,
        state: serde_json::Value,
        expected: Version,
    ) -> Result<Version> {
        self.check_available()?;
        let mut states = self.states.write().await;

        let current = states
            .get(address)
            .map(|s| s.version)
            .unwrap_or(Version::initial());

        if current != expected {
            metrics::counter!("state_store_conflicts_total").increment(1);
            return Err(StorageError::ConcurrencyConflict {
                address: address.clone(),
                expected,
                actual: current,
            });
        }

        let next = current.next();
        states.insert(
            address.clone(),
            StoredState::new(address.clone(), next, state),
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("state_store_writes_total").increment(1);
        tracing::trace!(%address, version = %next, "state written");

        Ok(next)
    }

    async fn clear_state(&self, address: &EntityAddress, expected: Version) -> Result<()> {
        self.check_available()?;
        let mut states = self.states.write().await;

        let current = states
            .get(address)
            .map(|s| s.version)
            .unwrap_or(Version::initial());

        if current != expected {
            return Err(StorageError::ConcurrencyConflict {
                address: address.clone(),
                expected,
                actual: current,
            });
        }

        states.remove(address);
        Ok(())
    }
}
