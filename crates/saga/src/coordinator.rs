//! Forwarding and recovery decisions for chained saga hops.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::TransactionId;
use ledger::TransactionStatus;
use runtime::{CallError, to_time_delta};

use crate::config::SagaConfig;
use crate::participants::TransactionParticipants;
use crate::pending::PendingTransaction;
use crate::transaction::SagaTransaction;

/// Result of forwarding from one participant to the rest of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Every later participant committed and the ledger knows it.
    Committed,
    /// A later participant refused; this participant must roll back.
    Aborted,
    /// The outcome is unknown; keep the pending marker.
    Uncertain,
}

/// Result of re-checking a pending marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The ledger knows the transaction completed; keep the delta.
    Committed,
    /// The transaction never completed; reverse the delta.
    RolledBack,
    /// Not decidable yet; keep the marker and check again later.
    StillPending,
}

/// Drives the ledger side of each saga hop.
///
/// A participant calls `forward` after committing locally and `resolve`
/// whenever it finds a pending marker (on activation, on its recovery timer
/// or before serving new work).
pub struct SagaCoordinator {
    ledger: Arc<dyn TransactionStatus>,
    config: SagaConfig,
}

impl SagaCoordinator {
    pub fn new(ledger: Arc<dyn TransactionStatus>, config: SagaConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn TransactionStatus> {
        &self.ledger
    }

    /// Asks the ledger whether `id` completed.
    pub async fn is_complete(&self, id: TransactionId) -> Result<bool, CallError> {
        self.ledger.is_complete(id).await
    }

    /// Completes the chain after participant `index` committed.
    ///
    /// The last participant records completion in the ledger; any other
    /// participant invokes the next one. A failed call is never read as
    /// success or failure: the ledger decides, and if it does not know yet
    /// the outcome stays uncertain.
    #[tracing::instrument(skip(self, peers, transaction), fields(transaction_id = %transaction.id()))]
    pub async fn forward<D, P>(
        &self,
        peers: &P,
        transaction: &Arc<SagaTransaction<D>>,
        index: usize,
    ) -> ForwardOutcome
    where
        D: Send + Sync + 'static,
        P: TransactionParticipants<D> + ?Sized,
    {
        let id = transaction.id();

        if transaction.is_last(index) {
            return match self.ledger.set_complete(id).await {
                Ok(()) => {
                    tracing::info!("saga complete");
                    ForwardOutcome::Committed
                }
                Err(e) => {
                    tracing::warn!(error = %e, "recording completion failed");
                    self.check_ledger(id).await
                }
            };
        }

        match peers.transact(Arc::clone(transaction), index + 1).await {
            Ok(true) => ForwardOutcome::Committed,
            Ok(false) => ForwardOutcome::Aborted,
            Err(e) => {
                tracing::warn!(next = index + 1, error = %e, "next participant did not answer");
                self.check_ledger(id).await
            }
        }
    }

    /// Decides what to do with a pending marker found at `now`.
    ///
    /// An absent ledger entry means failure, except for a marker whose
    /// forwarding ended uncertain less than the settle window ago: the
    /// completion may still be on its way. An unreachable ledger decides
    /// nothing.
    pub async fn resolve<D>(&self, pending: &PendingTransaction<D>, now: DateTime<Utc>) -> Resolution {
        match self.ledger.is_complete(pending.transaction_id).await {
            Ok(true) => Resolution::Committed,
            Ok(false) => match pending.uncertain_since {
                Some(since) if now - since < to_time_delta(self.config.settle_window()) => {
                    Resolution::StillPending
                }
                _ => Resolution::RolledBack,
            },
            Err(e) => {
                tracing::warn!(transaction_id = %pending.transaction_id, error = %e, "ledger unreachable");
                Resolution::StillPending
            }
        }
    }

    async fn check_ledger(&self, id: TransactionId) -> ForwardOutcome {
        match self.ledger.is_complete(id).await {
            Ok(true) => ForwardOutcome::Committed,
            Ok(false) | Err(_) => {
                metrics::counter!("saga_uncertain_total").increment(1);
                ForwardOutcome::Uncertain
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{EntityAddress, EntityId};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::transaction::Participant;

    #[derive(Default)]
    struct FakeLedger {
        complete: Mutex<HashSet<TransactionId>>,
        down: Mutex<bool>,
    }

    #[async_trait]
    impl TransactionStatus for FakeLedger {
        async fn set_complete(&self, id: TransactionId) -> Result<(), CallError> {
            if *self.down.lock().unwrap() {
                return Err(CallError::Unreachable(EntityAddress::ledger_shard(0)));
            }
            self.complete.lock().unwrap().insert(id);
            Ok(())
        }

        async fn is_complete(&self, id: TransactionId) -> Result<bool, CallError> {
            if *self.down.lock().unwrap() {
                return Err(CallError::Unreachable(EntityAddress::ledger_shard(0)));
            }
            Ok(self.complete.lock().unwrap().contains(&id))
        }
    }

    /// Answers every hop with a fixed reply.
    struct FixedPeers(Option<bool>);

    #[async_trait]
    impl TransactionParticipants<i32> for FixedPeers {
        async fn transact(
            &self,
            _transaction: Arc<SagaTransaction<i32>>,
            index: usize,
        ) -> Result<bool, CallError> {
            self.0.ok_or_else(|| CallError::Timeout {
                target: EntityAddress::account(EntityId::new()),
                after: Duration::from_secs(index as u64),
            })
        }
    }

    fn transaction() -> Arc<SagaTransaction<i32>> {
        Arc::new(
            SagaTransaction::new(
                TransactionId::new(),
                vec![
                    Participant { id: EntityId::new(), delta: -1 },
                    Participant { id: EntityId::new(), delta: 1 },
                ],
            )
            .unwrap(),
        )
    }

    fn coordinator(ledger: Arc<FakeLedger>) -> SagaCoordinator {
        SagaCoordinator::new(ledger, SagaConfig::default())
    }

    #[tokio::test]
    async fn last_participant_records_completion() {
        let ledger = Arc::new(FakeLedger::default());
        let c = coordinator(ledger.clone());
        let tx = transaction();

        let outcome = c.forward(&FixedPeers(Some(false)), &tx, 1).await;
        assert_eq!(outcome, ForwardOutcome::Committed);
        assert!(ledger.complete.lock().unwrap().contains(&tx.id()));
    }

    #[tokio::test]
    async fn explicit_refusal_aborts() {
        let c = coordinator(Arc::new(FakeLedger::default()));
        let outcome = c.forward(&FixedPeers(Some(false)), &transaction(), 0).await;
        assert_eq!(outcome, ForwardOutcome::Aborted);
    }

    #[tokio::test]
    async fn failed_call_defers_to_ledger() {
        let ledger = Arc::new(FakeLedger::default());
        let c = coordinator(ledger.clone());
        let tx = transaction();

        assert_eq!(c.forward(&FixedPeers(None), &tx, 0).await, ForwardOutcome::Uncertain);

        ledger.complete.lock().unwrap().insert(tx.id());
        assert_eq!(c.forward(&FixedPeers(None), &tx, 0).await, ForwardOutcome::Committed);
    }

    #[tokio::test]
    async fn resolve_rolls_back_unknown_marker() {
        let c = coordinator(Arc::new(FakeLedger::default()));
        let pending = PendingTransaction::new(TransactionId::new(), 5, Utc::now());
        assert_eq!(c.resolve(&pending, Utc::now()).await, Resolution::RolledBack);
    }

    #[tokio::test]
    async fn resolve_waits_out_uncertain_marker() {
        let c = coordinator(Arc::new(FakeLedger::default()));
        let now = Utc::now();
        let mut pending = PendingTransaction::new(TransactionId::new(), 5, now);
        pending.mark_uncertain(now);

        assert_eq!(c.resolve(&pending, now).await, Resolution::StillPending);

        let later = now + to_time_delta(c.config().settle_window());
        assert_eq!(c.resolve(&pending, later).await, Resolution::RolledBack);
    }

    #[tokio::test]
    async fn resolve_keeps_marker_while_ledger_is_down() {
        let ledger = Arc::new(FakeLedger::default());
        *ledger.down.lock().unwrap() = true;
        let c = coordinator(ledger);

        let pending = PendingTransaction::new(TransactionId::new(), 5, Utc::now());
        assert_eq!(c.resolve(&pending, Utc::now()).await, Resolution::StillPending);
    }
}
