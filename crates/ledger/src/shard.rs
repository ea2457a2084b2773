//! One shard of the transaction status ledger.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::{EntityAddress, TransactionId};
use rand::Rng;
use runtime::{TickInfo, TimerHandle, TimerService, WriteQueue};
use serde::{Deserialize, Serialize};
use state_store::StateStore;

use crate::config::LedgerConfig;
use crate::error::Result;

/// Name of the shard rotation timer.
pub const ROTATION_TIMER: &str = "ledger-rotation";

/// Durable state of a shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardState {
    pub current: HashSet<TransactionId>,
    pub archive: HashSet<TransactionId>,
    pub rotation_timer: Option<TimerHandle>,
    pub rotations: u64,
}

/// A ledger shard activation.
///
/// Shards are reentrant: unrelated transactions interleave freely, state is
/// only touched in short synchronous sections and every write goes through
/// the shard's `WriteQueue`.
pub struct LedgerShard {
    index: u16,
    state: Mutex<ShardState>,
    writes: WriteQueue,
}

impl LedgerShard {
    /// Loads shard `index`, registering its rotation timer on first creation.
    #[tracing::instrument(skip(config, store, timers))]
    pub async fn activate(
        index: u16,
        config: &LedgerConfig,
        store: Arc<dyn StateStore>,
        timers: &dyn TimerService,
    ) -> Result<Self> {
        let address = EntityAddress::ledger_shard(index);
        let (writes, state) = WriteQueue::load::<ShardState>(address.clone(), store).await?;
        let shard = Self {
            index,
            state: Mutex::new(state.unwrap_or_default()),
            writes,
        };

        if shard.lock().rotation_timer.is_none() {
            let first_delay = first_rotation_delay(config.purge_period);
            let handle = timers
                .register_or_update(&address, ROTATION_TIMER, first_delay, config.purge_period)
                .await?;
            shard.commit(|state| state.rotation_timer = Some(handle)).await?;
            tracing::debug!(index, ?first_delay, "rotation timer registered");
        }

        Ok(shard)
    }

    /// Returns the shard index.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Records `id` as complete. Writes only when the id is new to the
    /// current generation.
    ///
    /// The id becomes visible to `is_complete` only once it is durable.
    #[tracing::instrument(skip(self), fields(shard = self.index))]
    pub async fn set_complete(&self, id: TransactionId) -> Result<()> {
        if self.lock().current.contains(&id) {
            tracing::debug!("transaction already recorded");
            return Ok(());
        }

        self.commit(|state| {
            state.current.insert(id);
        })
        .await?;

        metrics::counter!("ledger_completions_total").increment(1);
        tracing::debug!("transaction recorded complete");
        Ok(())
    }

    /// Returns true if `id` is in either generation.
    pub fn is_complete(&self, id: TransactionId) -> bool {
        let state = self.lock();
        state.current.contains(&id) || state.archive.contains(&id)
    }

    /// Handles a timer tick. Only the rotation timer is recognised.
    #[tracing::instrument(skip(self, tick), fields(shard = self.index))]
    pub async fn on_timer_fired(&self, name: &str, tick: TickInfo) -> Result<()> {
        if name != ROTATION_TIMER {
            tracing::debug!(name, "ignoring unknown timer");
            return Ok(());
        }
        tracing::debug!(current_tick = %tick.current_tick, "rotation tick");
        self.rotate().await
    }

    /// Moves the current generation to the archive, dropping the old archive.
    pub async fn rotate(&self) -> Result<()> {
        let mut archived = 0;
        let mut forgotten = 0;
        self.commit(|state| {
            let current = std::mem::take(&mut state.current);
            forgotten = std::mem::replace(&mut state.archive, current).len();
            archived = state.archive.len();
            state.rotations += 1;
        })
        .await?;

        metrics::counter!("ledger_rotations_total").increment(1);
        tracing::info!(shard = self.index, archived, forgotten, "ledger shard rotated");
        Ok(())
    }

    /// Returns a copy of the shard's state.
    pub fn snapshot(&self) -> ShardState {
        self.lock().clone()
    }

    /// Applies `change` to a copy of the state taken at the head of the write
    /// queue, persists it, and only then makes it the live state.
    async fn commit<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut ShardState) + Send,
    {
        self.writes
            .write_then(
                || {
                    let mut next = self.snapshot();
                    change(&mut next);
                    next
                },
                |next| *self.lock() = next,
            )
            .await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ShardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Random delay in `(0, period]` so shards created together rotate apart.
fn first_rotation_delay(period: Duration) -> Duration {
    let max = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
    Duration::from_millis(rand::thread_rng().gen_range(1..=max))
}
