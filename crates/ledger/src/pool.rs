//! The shard pool.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use common::{EntityAddress, TransactionId};
use runtime::{ActivationTable, CallDispatcher, CallError, TickInfo, TimerService};
use state_store::StateStore;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::shard::LedgerShard;
use crate::status::TransactionStatus;

/// A fixed pool of ledger shards reached through the call dispatcher.
pub struct TransactionLedger {
    config: LedgerConfig,
    store: Arc<dyn StateStore>,
    timers: Arc<dyn TimerService>,
    dispatcher: Arc<CallDispatcher>,
    shards: ActivationTable<u16, LedgerShard>,
    self_ref: Weak<TransactionLedger>,
}

impl TransactionLedger {
    /// Creates the pool. Shards activate lazily on first reference.
    pub fn new(
        config: LedgerConfig,
        store: Arc<dyn StateStore>,
        timers: Arc<dyn TimerService>,
        dispatcher: Arc<CallDispatcher>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            store,
            timers,
            dispatcher,
            shards: ActivationTable::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Returns the ledger settings.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Returns the shard index that owns `id`.
    pub fn shard_for(&self, id: TransactionId) -> u16 {
        self.config.shard_for(id)
    }

    /// Returns the live activation of shard `index`, loading it if needed.
    pub async fn shard(&self, index: u16) -> Result<Arc<LedgerShard>> {
        self.shards
            .get_or_activate(&index, || {
                LedgerShard::activate(index, &self.config, self.store.clone(), self.timers.as_ref())
            })
            .await
    }

    /// Drops the in-memory activation of shard `index`.
    pub fn deactivate(&self, index: u16) {
        if self.shards.deactivate(&index).is_some() {
            tracing::debug!(index, "ledger shard deactivated");
        }
    }

    /// Returns the indexes of every live shard.
    pub fn active_shards(&self) -> Vec<u16> {
        self.shards.keys()
    }

    /// Delivers a timer tick to shard `index`.
    pub async fn on_timer_fired(&self, index: u16, name: &str, tick: TickInfo) -> Result<()> {
        let result = match self.shard(index).await {
            Ok(shard) => shard.on_timer_fired(name, tick).await,
            Err(e) => Err(e),
        };
        self.evict_on_conflict(index, &result);
        result
    }

    fn evict_on_conflict<T>(&self, index: u16, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_conflict() {
                tracing::warn!(index, error = %e, "ledger shard superseded, evicting");
                self.deactivate(index);
            }
        }
    }

    async fn call<T, F, Fut>(&self, index: u16, op: F) -> std::result::Result<T, CallError>
    where
        F: FnOnce(Arc<LedgerShard>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
        T: Send + 'static,
    {
        let target = EntityAddress::ledger_shard(index);
        let Some(ledger) = self.self_ref.upgrade() else {
            return Err(CallError::Unreachable(target));
        };

        self.dispatcher
            .dispatch(&target, async move {
                let result = match ledger.shard(index).await {
                    Ok(shard) => op(shard).await,
                    Err(e) => Err(e),
                };
                ledger.evict_on_conflict(index, &result);
                result
            })
            .await
    }
}

#[async_trait]
impl TransactionStatus for TransactionLedger {
    async fn set_complete(&self, id: TransactionId) -> std::result::Result<(), CallError> {
        self.call(self.shard_for(id), move |shard| async move {
            shard.set_complete(id).await
        })
        .await
    }

    async fn is_complete(&self, id: TransactionId) -> std::result::Result<bool, CallError> {
        self.call(self.shard_for(id), move |shard| async move {
            Ok::<_, LedgerError>(shard.is_complete(id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{DispatcherConfig, InMemoryTimerService, ManualClock};
    use state_store::InMemoryStateStore;
    use std::time::Duration;

    fn ledger(pool_size: u16) -> (Arc<TransactionLedger>, Arc<InMemoryStateStore>, Arc<CallDispatcher>) {
        let store = Arc::new(InMemoryStateStore::new());
        let timers = Arc::new(InMemoryTimerService::new(Arc::new(ManualClock::starting_now())));
        let dispatcher = Arc::new(CallDispatcher::new(DispatcherConfig {
            call_timeout: Duration::from_secs(1),
        }));
        let config = LedgerConfig {
            pool_size,
            ..LedgerConfig::default()
        };
        let ledger = TransactionLedger::new(config, store.clone(), timers, dispatcher.clone());
        (ledger, store, dispatcher)
    }

    #[tokio::test]
    async fn set_then_is_complete() {
        let (ledger, _, _) = ledger(4);
        let id = TransactionId::new();

        assert!(!ledger.is_complete(id).await.unwrap());
        ledger.set_complete(id).await.unwrap();
        assert!(ledger.is_complete(id).await.unwrap());
        assert_eq!(ledger.active_shards(), vec![ledger.shard_for(id)]);
    }

    #[tokio::test]
    async fn unreachable_shard_reports_call_error() {
        let (ledger, _, dispatcher) = ledger(1);
        dispatcher.set_unreachable(&EntityAddress::ledger_shard(0), true);

        let err = ledger.is_complete(TransactionId::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Unreachable(_)));
    }

    #[tokio::test]
    async fn superseded_shard_is_evicted_and_reloaded() {
        let (ledger, store, _) = ledger(1);
        let first = TransactionId::new();
        ledger.set_complete(first).await.unwrap();

        store.supersede(&EntityAddress::ledger_shard(0)).await;

        let second = TransactionId::new();
        let err = ledger.set_complete(second).await.unwrap_err();
        assert!(matches!(err, CallError::Failed { .. }));
        assert!(ledger.active_shards().is_empty());

        // The reloaded shard still knows the first completion
        assert!(ledger.is_complete(first).await.unwrap());
        assert!(!ledger.is_complete(second).await.unwrap());
        ledger.set_complete(second).await.unwrap();
        assert!(ledger.is_complete(second).await.unwrap());
    }
}
