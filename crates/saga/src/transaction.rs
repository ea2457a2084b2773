//! Immutable saga transaction data.

use std::collections::HashSet;

use common::{EntityId, TransactionId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// One participant and the delta it applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant<D> {
    pub id: EntityId,
    pub delta: D,
}

/// A transaction id and its participants in ascending id order.
///
/// Every overlapping pair of transactions visits shared participants in the
/// same relative order, so chained locking cannot form a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaTransaction<D> {
    id: TransactionId,
    participants: Vec<Participant<D>>,
}

impl<D> SagaTransaction<D> {
    /// Creates a transaction, sorting participants by id.
    ///
    /// Fails with fewer than two participants or a repeated participant.
    pub fn new(id: TransactionId, mut participants: Vec<Participant<D>>) -> Result<Self> {
        if participants.len() < 2 {
            return Err(SagaError::TooFewParticipants(participants.len()));
        }
        let mut seen = HashSet::with_capacity(participants.len());
        for participant in &participants {
            if !seen.insert(participant.id) {
                return Err(SagaError::DuplicateParticipant(participant.id));
            }
        }
        participants.sort_by_key(|p| p.id);
        Ok(Self { id, participants })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn participants(&self) -> &[Participant<D>] {
        &self.participants
    }

    pub fn participant(&self, index: usize) -> Option<&Participant<D>> {
        self.participants.get(index)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Returns true if `index` is the final participant.
    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.participants.len()
    }
}
