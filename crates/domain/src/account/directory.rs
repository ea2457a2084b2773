//! Routing to account activations.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cleanup::CleanupTargets;
use common::{EntityAddress, EntityId, TransactionId};
use runtime::{ActivationTable, CallDispatcher, CallError, TickInfo};
use saga::{SagaTransaction, TransactionParticipants};

use crate::account::entity::{Account, AccountServices};
use crate::account::peers::AccountPeers;
use crate::error::Result;
use crate::holdings::Holdings;

/// Every account activation of one kind of holdings, reached through the
/// call dispatcher.
///
/// Accounts activate lazily on first reference. An activation that hits a
/// storage error is dropped, so the next call reloads durable state.
pub struct AccountDirectory<H: Holdings> {
    services: AccountServices,
    dispatcher: Arc<CallDispatcher>,
    accounts: ActivationTable<EntityId, Account<H>>,
    self_ref: Weak<AccountDirectory<H>>,
}

impl<H: Holdings> AccountDirectory<H> {
    pub fn new(services: AccountServices, dispatcher: Arc<CallDispatcher>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            services,
            dispatcher,
            accounts: ActivationTable::new(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn services(&self) -> &AccountServices {
        &self.services
    }

    /// Returns the live activation of account `id`, loading it if needed.
    pub async fn account(&self, id: EntityId) -> Result<Arc<Account<H>>> {
        self.accounts
            .get_or_activate(&id, || Account::activate(id, self.services.clone(), self))
            .await
    }

    /// Drops the in-memory activation of account `id`.
    pub fn deactivate(&self, id: EntityId) {
        if self.accounts.deactivate(&id).is_some() {
            tracing::debug!(account = %id, "account deactivated");
        }
    }

    /// Drops every account activation.
    pub fn deactivate_all(&self) {
        self.accounts.deactivate_all();
    }

    pub fn active_accounts(&self) -> Vec<EntityId> {
        self.accounts.keys()
    }

    /// Delivers a timer tick to account `id`.
    pub async fn on_timer_fired(&self, id: EntityId, name: &str, tick: TickInfo) -> Result<()> {
        let result = match self.account(id).await {
            Ok(account) => account.on_timer_fired(name, tick, self).await,
            Err(e) => Err(e),
        };
        self.evict_on_storage_error(id, &result);
        result
    }

    /// Runs `op` on account `id` on behalf of an outside client.
    ///
    /// The account's own errors come back unchanged; a failed delivery is
    /// `AccountError::Call`.
    pub async fn request<T, F, Fut>(&self, id: EntityId, op: F) -> Result<T>
    where
        F: FnOnce(Arc<Account<H>>, Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let target = id.address();
        let Some(directory) = self.self_ref.upgrade() else {
            return Err(CallError::Unreachable(target).into());
        };

        self.dispatcher
            .dispatch_result(&target, directory.run(id, op))
            .await?
    }

    /// Returns the holdings of account `id`.
    pub async fn holdings(&self, id: EntityId) -> Result<H> {
        self.request(id, |account, _| async move { Ok(account.holdings().await) })
            .await
    }

    /// Applies a local change to account `id`.
    pub async fn apply(&self, id: EntityId, delta: H::Delta) -> Result<bool> {
        self.request(id, move |account, _| async move { account.apply(&delta).await })
            .await
    }

    /// Starts a pairwise transfer of `delta` from `from` to `to`.
    pub async fn initiate(
        &self,
        from: EntityId,
        to: EntityId,
        transaction_id: TransactionId,
        delta: H::Delta,
    ) -> Result<bool> {
        self.request(from, move |account, directory| async move {
            account
                .initiate(transaction_id, to, delta, &*directory)
                .await
        })
        .await
    }

    async fn run<T, F, Fut>(self: Arc<Self>, id: EntityId, op: F) -> Result<T>
    where
        F: FnOnce(Arc<Account<H>>, Arc<Self>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = match self.account(id).await {
            Ok(account) => op(account, Arc::clone(&self)).await,
            Err(e) => Err(e),
        };
        self.evict_on_storage_error(id, &result);
        result
    }

    /// Account-to-account call. The target's errors become `CallError::Failed`.
    async fn call<T, F, Fut>(&self, id: EntityId, op: F) -> std::result::Result<T, CallError>
    where
        F: FnOnce(Arc<Account<H>>, Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let target = id.address();
        let Some(directory) = self.self_ref.upgrade() else {
            return Err(CallError::Unreachable(target));
        };

        self.dispatcher.dispatch(&target, directory.run(id, op)).await
    }

    fn evict_on_storage_error<T>(&self, id: EntityId, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_storage() {
                tracing::warn!(account = %id, error = %e, "account storage failed, evicting");
                self.deactivate(id);
            }
        }
    }
}

#[async_trait]
impl<H: Holdings> TransactionParticipants<H::Delta> for AccountDirectory<H> {
    async fn transact(
        &self,
        transaction: Arc<SagaTransaction<H::Delta>>,
        index: usize,
    ) -> std::result::Result<bool, CallError> {
        let Some(participant) = transaction.participant(index) else {
            return Ok(false);
        };
        let id = participant.id;
        self.call(id, move |account, directory| async move {
            account.transact(transaction, index, &*directory).await
        })
        .await
    }
}

#[async_trait]
impl<H: Holdings> AccountPeers<H> for AccountDirectory<H> {
    async fn receive(
        &self,
        target: EntityId,
        transaction_id: TransactionId,
        delta: H::Delta,
    ) -> std::result::Result<bool, CallError> {
        self.call(target, move |account, directory| async move {
            account
                .receive(transaction_id, delta, &*directory)
                .await
        })
        .await
    }
}

#[async_trait]
impl<H: Holdings> CleanupTargets for AccountDirectory<H> {
    async fn cleanup(&self, target: &EntityAddress) -> std::result::Result<(), CallError> {
        let Some(id) = target.as_account() else {
            tracing::debug!(%target, "no cleanup for non-account entity");
            return Ok(());
        };
        self.call(id, |account, directory| async move {
            account.cleanup(&*directory).await
        })
        .await
    }
}
