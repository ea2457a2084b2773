//! Client-side transaction builder.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{EntityId, TransactionId};
use ledger::TransactionStatus;
use runtime::{Clock, to_time_delta};

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::participants::TransactionParticipants;
use crate::transaction::{Participant, SagaTransaction};

/// Collects participants and submits them as one saga.
///
/// Participants are kept sorted by id, so two builders given the same set
/// produce the same order. The transaction id is fixed on the first
/// `execute`; retries reuse it until the retry window closes.
pub struct TransactionBuilder<D> {
    participants: BTreeMap<EntityId, D>,
    transaction_id: Option<TransactionId>,
    expires_at: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
}

impl<D> TransactionBuilder<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn Clock>, config: SagaConfig) -> Self {
        Self {
            participants: BTreeMap::new(),
            transaction_id: None,
            expires_at: None,
            clock,
            config,
        }
    }

    /// Uses a caller-chosen id instead of a random one.
    pub fn with_transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = Some(id);
        self
    }

    /// Adds a participant. Each participant may appear once.
    pub fn add(&mut self, participant: EntityId, delta: D) -> Result<&mut Self> {
        if self.participants.contains_key(&participant) {
            return Err(SagaError::DuplicateParticipant(participant));
        }
        self.participants.insert(participant, delta);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// The id assigned to this transaction, once there is one.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    /// Participant ids in submission order.
    pub fn order(&self) -> Vec<EntityId> {
        self.participants.keys().copied().collect()
    }

    /// Builds the transaction under the current id, or a fresh one.
    pub fn build(&self) -> Result<SagaTransaction<D>> {
        let id = self.transaction_id.unwrap_or_default();
        self.build_with(id)
    }

    fn build_with(&self, id: TransactionId) -> Result<SagaTransaction<D>> {
        let participants = self
            .participants
            .iter()
            .map(|(id, delta)| Participant {
                id: *id,
                delta: delta.clone(),
            })
            .collect();
        SagaTransaction::new(id, participants)
    }

    /// Submits the transaction to its first participant.
    ///
    /// Returns `Ok(false)` without contacting anyone when fewer than two
    /// participants were added. A retry inside the window returns `true`
    /// straight away if the ledger already knows the transaction completed,
    /// and otherwise resubmits under the same id.
    #[tracing::instrument(skip_all, fields(participants = self.participants.len()))]
    pub async fn execute<P>(&mut self, peers: &P, ledger: &dyn TransactionStatus) -> Result<bool>
    where
        P: TransactionParticipants<D> + ?Sized,
    {
        if self.participants.len() < 2 {
            tracing::debug!("not enough participants");
            return Ok(false);
        }

        let now = self.clock.now();
        let id = match (self.transaction_id, self.expires_at) {
            (Some(id), Some(expires_at)) => {
                if now >= expires_at {
                    return Err(SagaError::Expired(id));
                }
                if ledger.is_complete(id).await? {
                    tracing::debug!(transaction_id = %id, "already complete");
                    return Ok(true);
                }
                id
            }
            (id, _) => {
                let id = id.unwrap_or_default();
                self.transaction_id = Some(id);
                self.expires_at = Some(now + to_time_delta(self.config.retry_window()));
                id
            }
        };

        let transaction = Arc::new(self.build_with(id)?);
        let started = Instant::now();
        let result = peers.transact(transaction, 0).await;
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(true) => {
                metrics::counter!("saga_commits_total").increment(1);
                tracing::info!(transaction_id = %id, "transaction committed");
                Ok(true)
            }
            Ok(false) => {
                metrics::counter!("saga_rollbacks_total").increment(1);
                tracing::warn!(transaction_id = %id, "transaction rolled back");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(transaction_id = %id, error = %e, "transaction outcome unknown");
                if matches!(ledger.is_complete(id).await, Ok(true)) {
                    metrics::counter!("saga_commits_total").increment(1);
                    return Ok(true);
                }
                Err(SagaError::OutcomePending(id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::ManualClock;
    use uuid::Uuid;

    fn builder() -> TransactionBuilder<i32> {
        TransactionBuilder::new(Arc::new(ManualClock::starting_now()), SagaConfig::default())
    }

    #[test]
    fn independent_builders_agree_on_order() {
        let ids: Vec<EntityId> = (0..5).map(|_| EntityId::new()).collect();

        let mut forward = builder();
        for id in &ids {
            forward.add(*id, 0).unwrap();
        }
        let mut backward = builder();
        for id in ids.iter().rev() {
            backward.add(*id, 0).unwrap();
        }

        assert_eq!(forward.order(), backward.order());
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(forward.order(), sorted);
    }

    #[test]
    fn duplicate_participant_is_rejected() {
        let mut b = builder();
        let id = EntityId::from_uuid(Uuid::from_u128(7));
        b.add(id, 1).unwrap();
        assert!(matches!(b.add(id, 2), Err(SagaError::DuplicateParticipant(p)) if p == id));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn build_needs_two_participants() {
        let mut b = builder();
        b.add(EntityId::new(), 1).unwrap();
        assert!(matches!(b.build(), Err(SagaError::TooFewParticipants(1))));

        b.add(EntityId::new(), -1).unwrap();
        assert_eq!(b.build().unwrap().len(), 2);
    }
}
