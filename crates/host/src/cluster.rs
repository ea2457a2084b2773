//! In-process wiring of every entity pool plus durable timer delivery.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cleanup::CleanupPool;
use common::EntityKind;
use domain::{AccountDirectory, AccountServices, Wallet, WalletDelta};
use futures_util::future::join_all;
use ledger::TransactionLedger;
use runtime::{CallDispatcher, Clock, InMemoryTimerService, TickInfo, TimerHandle};
use saga::{SagaConfig, SagaCoordinator, TransactionBuilder};
use state_store::InMemoryStateStore;
use tokio::time::MissedTickBehavior;

use crate::config::HostConfig;

/// Every pool hosted by this process, sharing one store, one timer service
/// and one call dispatcher.
pub struct Cluster {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<InMemoryStateStore>,
    pub timers: Arc<InMemoryTimerService>,
    pub dispatcher: Arc<CallDispatcher>,
    pub ledger: Arc<TransactionLedger>,
    pub cleanup: Arc<CleanupPool>,
    pub accounts: Arc<AccountDirectory<Wallet>>,
    saga: SagaConfig,
}

impl Cluster {
    /// Wires the pools from `config`, reading time from `clock`.
    pub fn new(config: &HostConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryStateStore::new());
        let timers = Arc::new(InMemoryTimerService::new(clock.clone()));
        let dispatcher = Arc::new(CallDispatcher::new(config.dispatcher_config()));
        let saga = config.saga_config();

        let ledger = TransactionLedger::new(
            config.ledger_config(),
            store.clone(),
            timers.clone(),
            dispatcher.clone(),
        );
        let cleanup = CleanupPool::new(
            config.cleanup_config(),
            clock.clone(),
            store.clone(),
            timers.clone(),
            dispatcher.clone(),
        );
        let services = AccountServices {
            config: config.account_config(),
            clock: clock.clone(),
            store: store.clone(),
            timers: timers.clone(),
            cleanup: cleanup.clone(),
            coordinator: Arc::new(SagaCoordinator::new(ledger.clone(), saga.clone())),
        };
        let accounts = AccountDirectory::new(services, dispatcher.clone());

        tracing::info!(
            ledger_shards = config.ledger_pool_size,
            cleanup_agents = config.cleanup_pool_size,
            purge_period = ?config.purge_period,
            "cluster wired"
        );

        Self {
            clock,
            store,
            timers,
            dispatcher,
            ledger,
            cleanup,
            accounts,
            saga,
        }
    }

    pub fn saga_config(&self) -> &SagaConfig {
        &self.saga
    }

    /// Returns an empty transaction builder bound to this cluster's clock.
    pub fn builder(&self) -> TransactionBuilder<WalletDelta> {
        TransactionBuilder::new(self.clock.clone(), self.saga.clone())
    }

    /// Delivers every due timer tick to its owner, reactivating it if needed.
    /// Returns how many ticks fired.
    pub async fn fire_due_timers(&self) -> usize {
        let due = self.timers.due();
        let fired = due.len();
        join_all(
            due.into_iter()
                .map(|(handle, tick)| self.deliver_tick(handle, tick)),
        )
        .await;
        fired
    }

    /// Polls the timer service every `poll` until `shutdown` resolves.
    pub async fn run_timer_loop(&self, poll: Duration, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {
                    self.fire_due_timers().await;
                }
            }
        }
        tracing::info!("timer loop stopped");
    }

    async fn deliver_tick(&self, handle: TimerHandle, tick: TickInfo) {
        let owner = &handle.owner;
        let name = handle.name.as_str();

        let result = match (owner.kind, owner.as_account(), owner.as_pool_index()) {
            (EntityKind::Account, Some(id), _) => self
                .accounts
                .on_timer_fired(id, name, tick)
                .await
                .map_err(|e| e.to_string()),
            (EntityKind::LedgerShard, _, Some(index)) => self
                .ledger
                .on_timer_fired(index, name, tick)
                .await
                .map_err(|e| e.to_string()),
            (EntityKind::CleanupAgent, _, Some(index)) => self
                .cleanup
                .on_timer_fired(index, name, tick, &*self.accounts)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            _ => Err("malformed timer owner".to_string()),
        };

        if let Err(error) = result {
            tracing::warn!(%owner, timer = name, %error, "timer delivery failed");
        }
    }
}
