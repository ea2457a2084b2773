//! The account entity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cleanup::CleanupRequester;
use common::{EntityAddress, EntityId, TransactionId};
use runtime::{Clock, TickInfo, TimerService, WriteQueue, to_time_delta};
use saga::{ForwardOutcome, PendingTransaction, Resolution, SagaCoordinator, SagaTransaction};
use state_store::StateStore;
use tokio::sync::Mutex;

use crate::account::applied::Outcome;
use crate::account::config::AccountConfig;
use crate::account::peers::AccountPeers;
use crate::account::state::{AccountState, InFlightTransfer};
use crate::error::{AccountError, Result};
use crate::holdings::{Delta, Holdings};
use crate::wallet::{Wallet, WalletDelta};

/// Name of the account recovery timer.
pub const RECOVERY_TIMER: &str = "account-recovery";

/// Shared collaborators every account activation needs.
#[derive(Clone)]
pub struct AccountServices {
    pub config: AccountConfig,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn StateStore>,
    pub timers: Arc<dyn TimerService>,
    pub cleanup: Arc<dyn CleanupRequester>,
    pub coordinator: Arc<SagaCoordinator>,
}

struct Inner<H: Holdings> {
    state: AccountState<H>,
    /// In-memory changes not yet persisted. Only changes whose loss is
    /// repaired by recovery are allowed to wait here.
    dirty: bool,
}

enum Delivery {
    Delivered,
    Refused,
    Uncertain,
}

/// An account activation.
///
/// Operations do not interleave: each one holds the state lock until it
/// returns, including while it waits on other entities.
pub struct Account<H: Holdings> {
    id: EntityId,
    address: EntityAddress,
    services: AccountServices,
    inner: Mutex<Inner<H>>,
    writes: WriteQueue,
}

impl<H: Holdings> Account<H> {
    /// Loads the account and settles anything left unresolved before it
    /// serves its first request.
    #[tracing::instrument(skip(services, peers))]
    pub async fn activate(
        id: EntityId,
        services: AccountServices,
        peers: &dyn AccountPeers<H>,
    ) -> Result<Self> {
        let address = id.address();
        let (writes, state) =
            WriteQueue::load::<AccountState<H>>(address.clone(), services.store.clone()).await?;
        let mut state = state.unwrap_or_default();
        state.applied.rebuild_index();

        let account = Self {
            id,
            address,
            services,
            inner: Mutex::new(Inner {
                state,
                dirty: false,
            }),
            writes,
        };

        {
            let mut inner = account.inner.lock().await;
            account.prune(&mut inner);
            if !inner.state.is_idle() {
                tracing::info!(account = %id, "recovering unresolved work");
            }
            account.settle(&mut inner, peers).await?;
            if inner.dirty && inner.state.recovery_timer.is_none() {
                account.persist(&mut inner).await?;
            }
        }
        Ok(account)
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Returns the current holdings. Reads may be stale mid-transfer.
    pub async fn holdings(&self) -> H {
        self.inner.lock().await.state.holdings.clone()
    }

    /// Returns a copy of the in-memory state.
    pub async fn snapshot(&self) -> AccountState<H> {
        self.inner.lock().await.state.clone()
    }

    /// Returns true if in-memory changes are waiting for the recovery timer.
    pub async fn has_deferred_write(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Applies `delta` locally if it keeps every quantity non-negative.
    pub async fn apply(&self, delta: &H::Delta) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.state.holdings.validate_and_apply(delta) {
            return Ok(false);
        }
        self.persist(&mut inner).await?;
        Ok(true)
    }

    /// Moves `delta` to `target` with the pairwise handshake.
    ///
    /// Returns `Ok(false)` if the delta would overdraw this account, if the
    /// target refused it, or if an earlier transfer is still unresolved.
    /// Returns `AccountError::OutcomePending` when delivery could not be
    /// confirmed; the transfer is then finished later by re-delivery.
    #[tracing::instrument(skip(self, delta, peers), fields(account = %self.id))]
    pub async fn initiate(
        &self,
        transaction_id: TransactionId,
        target: EntityId,
        delta: H::Delta,
        peers: &dyn AccountPeers<H>,
    ) -> Result<bool> {
        if target == self.id {
            return Ok(false);
        }

        let mut inner = self.inner.lock().await;
        self.settle(&mut inner, peers).await?;

        if let Some(transfer) = &inner.state.in_flight {
            if transfer.transaction_id == transaction_id {
                return Err(AccountError::OutcomePending(transaction_id));
            }
            tracing::debug!(blocking = %transfer.transaction_id, "earlier transfer unresolved");
            return Ok(false);
        }
        if let Some(outcome) = inner.state.applied.outcome(transaction_id) {
            tracing::debug!(?outcome, "transfer replayed");
            return Ok(outcome.succeeded());
        }
        if inner.state.pending.is_some() {
            return Ok(false);
        }

        self.request_cleanup_if_due(&mut inner).await;

        let applied = delta.inverse();
        if !inner.state.holdings.validate_and_apply(&applied) {
            tracing::debug!("insufficient holdings");
            return Ok(false);
        }

        if let Err(e) = self.ensure_recovery_timer(&mut inner).await {
            inner.state.holdings.reverse(&applied);
            return Err(e);
        }

        let now = self.now();
        let transfer = InFlightTransfer {
            transaction_id,
            target,
            delta,
            applied,
            started_at: now,
        };
        inner.state.in_flight = Some(transfer.clone());
        inner.state.applied.record(transaction_id, Outcome::Applied, now);
        // Intent must be durable before delivery starts.
        self.persist(&mut inner).await?;
        metrics::counter!("transfers_initiated_total").increment(1);

        match self.deliver(&transfer, peers).await {
            Delivery::Delivered => {
                inner.state.in_flight = None;
                inner.dirty = true;
                metrics::counter!("transfers_completed_total").increment(1);
                tracing::info!(%target, "transfer completed");
                Ok(true)
            }
            Delivery::Refused => {
                self.roll_back_transfer(&mut inner, &transfer);
                self.persist(&mut inner).await?;
                Ok(false)
            }
            Delivery::Uncertain => Err(AccountError::OutcomePending(transaction_id)),
        }
    }

    /// Receiver side of the pairwise handshake. Idempotent by id: a repeat
    /// delivery gets the first answer again.
    #[tracing::instrument(skip(self, delta, peers), fields(account = %self.id))]
    pub async fn receive(
        &self,
        transaction_id: TransactionId,
        delta: H::Delta,
        peers: &dyn AccountPeers<H>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        self.settle(&mut inner, peers).await?;

        if let Some(outcome) = inner.state.applied.outcome(transaction_id) {
            tracing::debug!(?outcome, "delivery replayed");
            return Ok(outcome.succeeded());
        }

        let accepted =
            inner.state.is_idle() && inner.state.holdings.validate_and_apply(&delta);
        let outcome = if accepted {
            Outcome::Applied
        } else {
            Outcome::Rejected
        };
        // A refusal is recorded too, so a late duplicate of this id can
        // never apply after the sender rolled back.
        let now = self.now();
        inner.state.applied.record(transaction_id, outcome, now);
        self.persist(&mut inner).await?;

        if !accepted {
            tracing::debug!("delivery refused");
        }
        Ok(accepted)
    }

    /// Runs hop `index` of a saga: commit locally, then forward.
    ///
    /// Returns `AccountError::OutcomePending` when the rest of the chain did
    /// not answer and the ledger does not know the outcome yet. The pending
    /// marker then stays until recovery settles it.
    #[tracing::instrument(
        skip(self, transaction, peers),
        fields(account = %self.id, transaction_id = %transaction.id())
    )]
    pub async fn transact(
        &self,
        transaction: Arc<SagaTransaction<H::Delta>>,
        index: usize,
        peers: &dyn AccountPeers<H>,
    ) -> Result<bool> {
        let Some(participant) = transaction.participant(index) else {
            return Ok(false);
        };
        if participant.id != self.id {
            tracing::warn!(expected = %participant.id, "hop delivered to the wrong account");
            return Ok(false);
        }
        let transaction_id = transaction.id();
        let delta = participant.delta.clone();

        let mut inner = self.inner.lock().await;

        // A retry of a hop that ended uncertain forwards again without
        // reapplying.
        let same_pending = inner
            .state
            .pending
            .as_ref()
            .is_some_and(|p| p.transaction_id == transaction_id);
        if same_pending {
            tracing::debug!("retrying uncertain hop");
            return self.finish_hop(&mut inner, &transaction, index, peers).await;
        }

        self.settle(&mut inner, peers).await?;

        if let Some(outcome) = inner.state.applied.outcome(transaction_id) {
            tracing::debug!(?outcome, "hop replayed");
            return Ok(outcome.succeeded());
        }
        if !inner.state.is_idle() {
            tracing::debug!("earlier work unresolved");
            return Ok(false);
        }

        self.ensure_recovery_timer(&mut inner).await?;

        let now = self.now();
        if !inner.state.holdings.validate_and_apply(&delta) {
            inner
                .state
                .applied
                .record(transaction_id, Outcome::Rejected, now);
            self.persist(&mut inner).await?;
            tracing::info!("local commit refused");
            return Ok(false);
        }

        inner.state.pending = Some(PendingTransaction::new(transaction_id, delta, now));
        inner
            .state
            .applied
            .record(transaction_id, Outcome::Applied, now);
        // The marker must be durable before forwarding.
        self.persist(&mut inner).await?;

        self.finish_hop(&mut inner, &transaction, index, peers).await
    }

    /// Reconciles any stale in-flight transfer or pending transaction.
    /// Invoked by the cleanup agents; safe to call at any time.
    #[tracing::instrument(skip(self, peers), fields(account = %self.id))]
    pub async fn cleanup(&self, peers: &dyn AccountPeers<H>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.prune(&mut inner);
        self.settle(&mut inner, peers).await?;
        if inner.dirty {
            self.persist(&mut inner).await?;
        }
        Ok(())
    }

    /// Handles a recovery timer tick.
    ///
    /// Flushes deferred changes and settles unresolved work. Once the account
    /// is idle with nothing to flush, the timer cancels itself; the cleared
    /// handle is persisted before unregistering.
    #[tracing::instrument(skip(self, tick, peers), fields(account = %self.id))]
    pub async fn on_timer_fired(
        &self,
        name: &str,
        tick: TickInfo,
        peers: &dyn AccountPeers<H>,
    ) -> Result<()> {
        if name != RECOVERY_TIMER {
            tracing::debug!(name, "ignoring unknown timer");
            return Ok(());
        }
        tracing::debug!(current_tick = %tick.current_tick, "recovery tick");

        let mut inner = self.inner.lock().await;
        self.prune(&mut inner);
        self.settle(&mut inner, peers).await?;

        if inner.dirty {
            self.persist(&mut inner).await?;
            return Ok(());
        }
        if inner.state.is_idle() {
            let handle = match inner.state.recovery_timer.take() {
                Some(handle) => {
                    self.persist(&mut inner).await?;
                    Some(handle)
                }
                // An earlier tick persisted the cleared handle but failed to
                // cancel the registration.
                None => {
                    self.services
                        .timers
                        .registration(&self.address, RECOVERY_TIMER)
                        .await?
                }
            };
            if let Some(handle) = handle {
                self.services.timers.unregister(&handle).await?;
                tracing::debug!("recovery timer cancelled");
            }
        }
        Ok(())
    }

    async fn finish_hop(
        &self,
        inner: &mut Inner<H>,
        transaction: &Arc<SagaTransaction<H::Delta>>,
        index: usize,
        peers: &dyn AccountPeers<H>,
    ) -> Result<bool> {
        let transaction_id = transaction.id();
        let outcome = self
            .services
            .coordinator
            .forward(peers, transaction, index)
            .await;

        match outcome {
            ForwardOutcome::Committed => {
                // The ledger holds the outcome; clearing the marker can wait.
                inner.state.pending = None;
                inner.dirty = true;
                tracing::debug!("hop committed");
                Ok(true)
            }
            ForwardOutcome::Aborted => {
                if let Some(pending) = inner.state.pending.take() {
                    inner.state.holdings.reverse(&pending.delta);
                }
                inner
                    .state
                    .applied
                    .mark(transaction_id, Outcome::RolledBack);
                self.persist(inner).await?;
                tracing::warn!("hop rolled back");
                Ok(false)
            }
            ForwardOutcome::Uncertain => {
                let now = self.now();
                if let Some(pending) = inner.state.pending.as_mut() {
                    pending.mark_uncertain(now);
                }
                self.persist(inner).await?;
                tracing::warn!("hop outcome pending");
                Err(AccountError::OutcomePending(transaction_id))
            }
        }
    }

    async fn settle(&self, inner: &mut Inner<H>, peers: &dyn AccountPeers<H>) -> Result<()> {
        if let Some(transfer) = inner.state.in_flight.clone() {
            match self.deliver(&transfer, peers).await {
                Delivery::Delivered => {
                    inner.state.in_flight = None;
                    inner.dirty = true;
                    metrics::counter!("transfers_completed_total").increment(1);
                    tracing::info!(transaction_id = %transfer.transaction_id, "stale transfer delivered");
                }
                Delivery::Refused => {
                    self.roll_back_transfer(inner, &transfer);
                    self.persist(inner).await?;
                }
                Delivery::Uncertain => {}
            }
        }

        if let Some(pending) = inner.state.pending.clone() {
            let resolution = self
                .services
                .coordinator
                .resolve(&pending, self.now())
                .await;
            match resolution {
                Resolution::Committed => {
                    inner.state.pending = None;
                    inner.dirty = true;
                    metrics::counter!("saga_recoveries_total").increment(1);
                    tracing::info!(transaction_id = %pending.transaction_id, "pending transaction committed");
                }
                Resolution::RolledBack => {
                    inner.state.holdings.reverse(&pending.delta);
                    inner
                        .state
                        .applied
                        .mark(pending.transaction_id, Outcome::RolledBack);
                    inner.state.pending = None;
                    self.persist(inner).await?;
                    metrics::counter!("saga_recoveries_total").increment(1);
                    tracing::warn!(transaction_id = %pending.transaction_id, "pending transaction never completed, rolled back");
                }
                Resolution::StillPending => {}
            }
        }
        Ok(())
    }

    async fn deliver(
        &self,
        transfer: &InFlightTransfer<H::Delta>,
        peers: &dyn AccountPeers<H>,
    ) -> Delivery {
        match peers
            .receive(transfer.target, transfer.transaction_id, transfer.delta.clone())
            .await
        {
            Ok(true) => Delivery::Delivered,
            Ok(false) => Delivery::Refused,
            Err(e) => {
                metrics::counter!("transfers_uncertain_total").increment(1);
                tracing::warn!(
                    transaction_id = %transfer.transaction_id,
                    target = %transfer.target,
                    error = %e,
                    "delivery unconfirmed"
                );
                Delivery::Uncertain
            }
        }
    }

    fn roll_back_transfer(&self, inner: &mut Inner<H>, transfer: &InFlightTransfer<H::Delta>) {
        inner.state.holdings.reverse(&transfer.applied);
        inner
            .state
            .applied
            .mark(transfer.transaction_id, Outcome::RolledBack);
        inner.state.in_flight = None;
        metrics::counter!("transfers_rolled_back_total").increment(1);
        tracing::warn!(
            transaction_id = %transfer.transaction_id,
            target = %transfer.target,
            "receiver refused transfer, rolled back"
        );
    }

    /// Asks a cleanup agent to check on this account later, at most once per
    /// cleanup interval.
    async fn request_cleanup_if_due(&self, inner: &mut Inner<H>) {
        let now = self.now();
        let cutoff = now - to_time_delta(self.services.config.cleanup_after);
        let previous = inner.state.cleanup_requested_at;
        if previous.is_some_and(|at| at >= cutoff) {
            return;
        }

        inner.state.cleanup_requested_at = Some(now);
        if let Err(e) = self
            .services
            .cleanup
            .request_cleanup(self.address.clone())
            .await
        {
            tracing::warn!(error = %e, "cleanup request failed");
            inner.state.cleanup_requested_at = previous;
        }
    }

    async fn ensure_recovery_timer(&self, inner: &mut Inner<H>) -> Result<()> {
        if inner.state.recovery_timer.is_some() {
            return Ok(());
        }
        let period = self.services.config.recovery_period;
        let handle = self
            .services
            .timers
            .register_or_update(&self.address, RECOVERY_TIMER, period, period)
            .await?;
        inner.state.recovery_timer = Some(handle);
        Ok(())
    }

    fn prune(&self, inner: &mut Inner<H>) {
        let cutoff = self.now() - to_time_delta(self.services.config.applied_retention);
        if inner.state.applied.prune(cutoff) > 0 {
            inner.dirty = true;
        }
    }

    async fn persist(&self, inner: &mut Inner<H>) -> Result<()> {
        self.writes.write(&inner.state).await?;
        inner.dirty = false;
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.services.clock.now()
    }
}

impl Account<Wallet> {
    /// Adds currency. Amounts of zero or less are ignored.
    pub async fn add_currency(&self, amount: i64) -> Result<()> {
        if amount > 0 {
            self.apply(&WalletDelta::currency(amount)).await?;
        }
        Ok(())
    }

    /// Adds goods. Amounts of zero or less are ignored.
    pub async fn add_goods(&self, amount: i64) -> Result<()> {
        if amount > 0 {
            self.apply(&WalletDelta::goods(amount)).await?;
        }
        Ok(())
    }

    /// Spends currency. Returns false for amounts of zero or less and when
    /// the balance is insufficient.
    pub async fn spend_currency(&self, amount: i64) -> Result<bool> {
        if amount <= 0 {
            return Ok(false);
        }
        let spent = self.apply(&WalletDelta::currency(-amount)).await?;
        if !spent {
            tracing::info!(account = %self.id, amount, "insufficient currency");
        }
        Ok(spent)
    }

    /// Spends goods. Returns false for amounts of zero or less and when the
    /// stock is insufficient.
    pub async fn spend_goods(&self, amount: i64) -> Result<bool> {
        if amount <= 0 {
            return Ok(false);
        }
        let spent = self.apply(&WalletDelta::goods(-amount)).await?;
        if !spent {
            tracing::info!(account = %self.id, amount, "insufficient goods");
        }
        Ok(spent)
    }
}
