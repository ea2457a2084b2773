//! Activation bookkeeping: at most one live activation per entity key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// Table of live activations keyed by entity identity.
///
/// Concurrent first references to the same key share a single activation.
/// A failed activation leaves nothing behind, so the next reference retries.
pub struct ActivationTable<K, A> {
    cells: Mutex<HashMap<K, Arc<OnceCell<Arc<A>>>>>,
}

impl<K, A> ActivationTable<K, A>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live activation for `key`, creating it with `activate` if needed.
    pub async fn get_or_activate<F, Fut, E>(&self, key: &K, activate: F) -> Result<Arc<A>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<A, E>>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let activation = cell
            .get_or_try_init(|| async { activate().await.map(Arc::new) })
            .await?;
        Ok(activation.clone())
    }

    /// Returns the live activation for `key` without creating one.
    pub fn get(&self, key: &K) -> Option<Arc<A>> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Drops the activation for `key`. Its in-memory state is lost; the next
    /// reference reloads from storage. Returns the dropped activation, if any.
    pub fn deactivate(&self, key: &K) -> Option<Arc<A>> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.remove(key).and_then(|cell| cell.get().cloned())
    }

    /// Drops every activation.
    pub fn deactivate_all(&self) {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns the keys of every live activation.
    pub fn keys(&self) -> Vec<K> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the number of live activations.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Returns true if nothing is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, A> Default for ActivationTable<K, A>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
