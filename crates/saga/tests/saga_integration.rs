//! Integration tests for chained saga execution against the real ledger.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{EntityAddress, EntityId};
use ledger::{LedgerConfig, TransactionLedger, TransactionStatus};
use runtime::{CallDispatcher, CallError, DispatcherConfig, InMemoryTimerService, ManualClock};
use saga::{
    ForwardOutcome, SagaConfig, SagaCoordinator, SagaError, SagaTransaction, TransactionBuilder,
    TransactionParticipants,
};
use state_store::InMemoryStateStore;

/// Minimal participants holding one signed balance each.
struct Balances {
    balances: Mutex<HashMap<EntityId, i64>>,
    refusing: Mutex<HashSet<EntityId>>,
    silent: Mutex<HashSet<EntityId>>,
    hops: AtomicUsize,
    coordinator: SagaCoordinator,
}

impl Balances {
    fn balance(&self, id: EntityId) -> i64 {
        self.balances.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    fn seed(&self, id: EntityId, amount: i64) {
        self.balances.lock().unwrap().insert(id, amount);
    }

    fn apply(&self, id: EntityId, delta: i64) -> bool {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(id).or_insert(0);
        if *balance + delta < 0 {
            return false;
        }
        *balance += delta;
        true
    }
}

#[async_trait]
impl TransactionParticipants<i64> for Balances {
    async fn transact(
        &self,
        transaction: Arc<SagaTransaction<i64>>,
        index: usize,
    ) -> Result<bool, CallError> {
        self.hops.fetch_add(1, Ordering::SeqCst);
        let participant = transaction.participant(index).unwrap().clone();
        let address = EntityAddress::account(participant.id);

        if self.silent.lock().unwrap().contains(&participant.id) {
            return Err(CallError::Unreachable(address));
        }
        if self.refusing.lock().unwrap().contains(&participant.id)
            || !self.apply(participant.id, participant.delta)
        {
            return Ok(false);
        }

        match self.coordinator.forward(self, &transaction, index).await {
            ForwardOutcome::Committed => Ok(true),
            ForwardOutcome::Aborted => {
                self.apply(participant.id, -participant.delta);
                Ok(false)
            }
            ForwardOutcome::Uncertain => Err(CallError::Failed {
                target: address,
                reason: "outcome pending".to_string(),
            }),
        }
    }
}

struct Harness {
    clock: ManualClock,
    ledger: Arc<TransactionLedger>,
    peers: Balances,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::starting_now();
        let timers = Arc::new(InMemoryTimerService::new(Arc::new(clock.clone())));
        let dispatcher = Arc::new(CallDispatcher::new(DispatcherConfig {
            call_timeout: Duration::from_secs(1),
        }));
        let ledger = TransactionLedger::new(
            LedgerConfig::default(),
            Arc::new(InMemoryStateStore::new()),
            timers,
            dispatcher,
        );
        let peers = Balances {
            balances: Mutex::new(HashMap::new()),
            refusing: Mutex::new(HashSet::new()),
            silent: Mutex::new(HashSet::new()),
            hops: AtomicUsize::new(0),
            coordinator: SagaCoordinator::new(ledger.clone(), SagaConfig::default()),
        };
        Self {
            clock,
            ledger,
            peers,
        }
    }

    fn builder(&self) -> TransactionBuilder<i64> {
        TransactionBuilder::new(Arc::new(self.clock.clone()), SagaConfig::default())
    }
}

#[tokio::test]
async fn three_party_transaction_commits_everywhere() {
    let h = Harness::new();
    let (a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new());
    h.peers.seed(a, 10);

    let mut tx = h.builder();
    tx.add(a, -10).unwrap().add(b, 4).unwrap().add(c, 6).unwrap();

    assert!(tx.execute(&h.peers, &*h.ledger).await.unwrap());
    assert_eq!(h.peers.balance(a), 0);
    assert_eq!(h.peers.balance(b), 4);
    assert_eq!(h.peers.balance(c), 6);

    let id = tx.transaction_id().unwrap();
    assert!(h.ledger.is_complete(id).await.unwrap());
}

#[tokio::test]
async fn refusal_at_last_participant_rolls_back_the_rest() {
    let h = Harness::new();
    let mut ids = vec![EntityId::new(), EntityId::new(), EntityId::new()];
    ids.sort();
    for id in &ids {
        h.peers.seed(*id, 5);
    }
    h.peers.refusing.lock().unwrap().insert(ids[2]);

    let mut tx = h.builder();
    tx.add(ids[0], -5).unwrap().add(ids[1], 5).unwrap().add(ids[2], 0).unwrap();

    assert!(!tx.execute(&h.peers, &*h.ledger).await.unwrap());
    for id in &ids {
        assert_eq!(h.peers.balance(*id), 5);
    }
    assert!(!h.ledger.is_complete(tx.transaction_id().unwrap()).await.unwrap());
}

#[tokio::test]
async fn retry_after_commit_does_not_resubmit() {
    let h = Harness::new();
    let (a, b) = (EntityId::new(), EntityId::new());
    h.peers.seed(a, 5);

    let mut tx = h.builder();
    tx.add(a, -5).unwrap().add(b, 5).unwrap();
    assert!(tx.execute(&h.peers, &*h.ledger).await.unwrap());
    let hops = h.peers.hops.load(Ordering::SeqCst);

    assert!(tx.execute(&h.peers, &*h.ledger).await.unwrap());
    assert_eq!(h.peers.hops.load(Ordering::SeqCst), hops);
    assert_eq!(h.peers.balance(a), 0);
    assert_eq!(h.peers.balance(b), 5);
}

#[tokio::test]
async fn lost_hop_reports_pending_and_retry_expires() {
    let h = Harness::new();
    let mut ids = vec![EntityId::new(), EntityId::new()];
    ids.sort();
    h.peers.seed(ids[0], 5);
    h.peers.silent.lock().unwrap().insert(ids[1]);

    let mut tx = h.builder();
    tx.add(ids[0], -5).unwrap().add(ids[1], 5).unwrap();

    let err = tx.execute(&h.peers, &*h.ledger).await.unwrap_err();
    assert!(matches!(err, SagaError::OutcomePending(id) if id == tx.transaction_id().unwrap()));

    h.clock.advance(SagaConfig::default().retry_window());
    let err = tx.execute(&h.peers, &*h.ledger).await.unwrap_err();
    assert!(matches!(err, SagaError::Expired(_)));
}

#[tokio::test]
async fn single_participant_is_a_no_op() {
    let h = Harness::new();
    let a = EntityId::new();
    h.peers.seed(a, 5);

    let mut tx = h.builder();
    tx.add(a, -5).unwrap();
    assert!(!tx.execute(&h.peers, &*h.ledger).await.unwrap());
    assert_eq!(h.peers.balance(a), 5);
    assert_eq!(h.peers.hops.load(Ordering::SeqCst), 0);
}
