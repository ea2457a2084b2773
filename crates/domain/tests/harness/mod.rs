//! Shared wiring for account integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cleanup::{CleanupConfig, CleanupPool};
use common::{EntityId, EntityKind};
use domain::{AccountConfig, AccountDirectory, AccountServices, Wallet, WalletDelta};
use ledger::{LedgerConfig, TransactionLedger};
use runtime::{CallDispatcher, DispatcherConfig, InMemoryTimerService, ManualClock};
use saga::{SagaConfig, SagaCoordinator, TransactionBuilder};
use state_store::InMemoryStateStore;

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<InMemoryStateStore>,
    pub timers: Arc<InMemoryTimerService>,
    pub dispatcher: Arc<CallDispatcher>,
    pub ledger: Arc<TransactionLedger>,
    pub cleanup: Arc<CleanupPool>,
    pub accounts: Arc<AccountDirectory<Wallet>>,
    pub saga: SagaConfig,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let store = Arc::new(InMemoryStateStore::new());
        let timers = Arc::new(InMemoryTimerService::new(Arc::new(clock.clone())));
        let dispatcher = Arc::new(CallDispatcher::new(DispatcherConfig {
            call_timeout: Duration::from_millis(500),
        }));

        let ledger_config = LedgerConfig {
            pool_size: 16,
            ..LedgerConfig::default()
        };
        let saga = SagaConfig {
            purge_period: ledger_config.purge_period,
        };
        let ledger = TransactionLedger::new(
            ledger_config,
            store.clone(),
            timers.clone(),
            dispatcher.clone(),
        );
        let cleanup = CleanupPool::new(
            CleanupConfig::default(),
            Arc::new(clock.clone()),
            store.clone(),
            timers.clone(),
            dispatcher.clone(),
        );

        let services = AccountServices {
            config: AccountConfig {
                recovery_period: saga.recovery_period(),
                ..AccountConfig::default()
            },
            clock: Arc::new(clock.clone()),
            store: store.clone(),
            timers: timers.clone(),
            cleanup: cleanup.clone(),
            coordinator: Arc::new(SagaCoordinator::new(ledger.clone(), saga.clone())),
        };
        let accounts = AccountDirectory::new(services, dispatcher.clone());

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

    /// Creates an account holding the given amounts.
    pub async fn funded(&self, currency: i64, goods: i64) -> EntityId {
        let id = EntityId::new();
        self.fund(id, currency, goods).await;
        id
    }

    /// Deposits into account `id`, activating it if needed.
    pub async fn fund(&self, id: EntityId, currency: i64, goods: i64) {
        assert!(
            self.accounts
                .apply(id, WalletDelta::new(currency, goods))
                .await
                .unwrap()
        );
    }

    pub async fn wallet(&self, id: EntityId) -> Wallet {
        self.accounts.holdings(id).await.unwrap()
    }

    pub fn builder(&self) -> TransactionBuilder<WalletDelta> {
        TransactionBuilder::new(Arc::new(self.clock.clone()), self.saga.clone())
    }

    /// Delivers every due timer tick to its owner. Returns how many fired.
    pub async fn fire_due_timers(&self) -> usize {
        let due = self.timers.due();
        for (handle, tick) in &due {
            let owner = &handle.owner;
            match owner.kind {
                EntityKind::Account => {
                    if let Some(id) = owner.as_account() {
                        let _ = self.accounts.on_timer_fired(id, &handle.name, *tick).await;
                    }
                }
                EntityKind::LedgerShard => {
                    if let Some(index) = owner.as_pool_index() {
                        let _ = self.ledger.on_timer_fired(index, &handle.name, *tick).await;
                    }
                }
                EntityKind::CleanupAgent => {
                    if let Some(index) = owner.as_pool_index() {
                        let _ = self
                            .cleanup
                            .on_timer_fired(index, &handle.name, *tick, &*self.accounts)
                            .await;
                    }
                }
            }
        }
        due.len()
    }

    /// Moves the clock forward and fires whatever became due.
    pub async fn advance(&self, by: Duration) -> usize {
        self.clock.advance(by);
        self.fire_due_timers().await
    }
}
