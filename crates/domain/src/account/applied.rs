//! The applied-transaction record.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};

/// What an account did with a transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The delta was applied and stands.
    Applied,
    /// The delta was refused; it was never applied.
    Rejected,
    /// The delta was applied and later reversed.
    RolledBack,
}

impl Outcome {
    /// The answer an idempotent replay of the same id gets.
    pub fn succeeded(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    id: TransactionId,
    at: DateTime<Utc>,
    outcome: Outcome,
}

/// Recently seen transaction ids in arrival order.
///
/// Only the entry queue is persisted; the lookup index is rebuilt after
/// loading with `rebuild_index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliedTransactions {
    entries: VecDeque<Entry>,
    #[serde(skip)]
    index: HashMap<TransactionId, Outcome>,
}

impl PartialEq for AppliedTransactions {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl AppliedTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the lookup index from the entry queue.
    pub fn rebuild_index(&mut self) {
        self.index = self.entries.iter().map(|e| (e.id, e.outcome)).collect();
    }

    /// Returns the recorded outcome for `id`.
    pub fn outcome(&self, id: TransactionId) -> Option<Outcome> {
        self.index.get(&id).copied()
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Records a first outcome for `id`. Ids already present are left alone.
    pub fn record(&mut self, id: TransactionId, outcome: Outcome, at: DateTime<Utc>) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, outcome);
        self.entries.push_back(Entry { id, at, outcome });
        true
    }

    /// Changes the outcome of an id already recorded.
    pub fn mark(&mut self, id: TransactionId, outcome: Outcome) {
        if let Some(entry) = self.entries.iter_mut().rev().find(|e| e.id == id) {
            entry.outcome = outcome;
            self.index.insert(id, outcome);
        }
    }

    /// Drops every entry recorded before `cutoff`. Returns how many were dropped.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut dropped = 0;
        while self.entries.front().is_some_and(|e| e.at < cutoff) {
            if let Some(entry) = self.entries.pop_front() {
                self.index.remove(&entry.id);
                dropped += 1;
            }
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
