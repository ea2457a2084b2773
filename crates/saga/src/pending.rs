use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};

/// A participant's durable marker for a saga it has applied but not settled.
///
/// While the marker is set the participant refuses unrelated work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction<D> {
    pub transaction_id: TransactionId,
    pub delta: D,
    pub started_at: DateTime<Utc>,
    /// Set when forwarding ended without a known outcome.
    pub uncertain_since: Option<DateTime<Utc>>,
}

impl<D> PendingTransaction<D> {
    pub fn new(transaction_id: TransactionId, delta: D, started_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id,
            delta,
            started_at,
            uncertain_since: None,
        }
    }

    pub fn mark_uncertain(&mut self, at: DateTime<Utc>) {
        self.uncertain_since.get_or_insert(at);
    }

    pub fn is_uncertain(&self) -> bool {
        self.uncertain_since.is_some()
    }
}
