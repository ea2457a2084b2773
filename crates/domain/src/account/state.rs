//! Durable account state.

use chrono::{DateTime, Utc};
use common::{EntityId, TransactionId};
use runtime::TimerHandle;
use saga::PendingTransaction;
use serde::{Deserialize, Serialize};

use crate::account::applied::AppliedTransactions;
use crate::holdings::Holdings;

/// A pairwise transfer applied locally but not yet confirmed by the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightTransfer<D> {
    pub transaction_id: TransactionId,
    pub target: EntityId,
    /// The delta the target receives.
    pub delta: D,
    /// The delta applied here, undone on rollback.
    pub applied: D,
    pub started_at: DateTime<Utc>,
}

/// Everything an account persists.
///
/// At most one of `in_flight` and `pending` is set at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AccountState<H: Holdings> {
    pub holdings: H,
    pub applied: AppliedTransactions,
    pub in_flight: Option<InFlightTransfer<H::Delta>>,
    pub pending: Option<PendingTransaction<H::Delta>>,
    pub cleanup_requested_at: Option<DateTime<Utc>>,
    pub recovery_timer: Option<TimerHandle>,
}

impl<H: Holdings> AccountState<H> {
    /// Returns true if no transfer or transaction is unresolved.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_none()
    }
}

impl<H: Holdings> Default for AccountState<H> {
    fn default() -> Self {
        Self {
            holdings: H::default(),
            applied: AppliedTransactions::default(),
            in_flight: None,
            pending: None,
            cleanup_requested_at: None,
            recovery_timer: None,
        }
    }
}
