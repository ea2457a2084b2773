//! The cleanup agent pool.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use common::EntityAddress;
use runtime::{ActivationTable, CallDispatcher, CallError, Clock, TickInfo, TimerService};
use state_store::StateStore;

use crate::agent::{CleanupAgent, CleanupReport};
use crate::config::CleanupConfig;
use crate::error::Result;
use crate::traits::{CleanupRequester, CleanupTargets};

/// A fixed pool of cleanup agents reached through the call dispatcher.
pub struct CleanupPool {
    config: CleanupConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    timers: Arc<dyn TimerService>,
    dispatcher: Arc<CallDispatcher>,
    agents: ActivationTable<u16, CleanupAgent>,
    self_ref: Weak<CleanupPool>,
}

impl CleanupPool {
    pub fn new(
        config: CleanupConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore>,
        timers: Arc<dyn TimerService>,
        dispatcher: Arc<CallDispatcher>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            clock,
            store,
            timers,
            dispatcher,
            agents: ActivationTable::new(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Returns the agent index serving `target`: its placement byte modulo
    /// the pool size.
    pub fn agent_for(&self, target: &EntityAddress) -> u16 {
        u16::from(target.placement_byte()) % self.config.pool_size.max(1)
    }

    /// Returns the live activation of agent `index`, loading it if needed.
    pub async fn agent(&self, index: u16) -> Result<Arc<CleanupAgent>> {
        self.agents
            .get_or_activate(&index, || {
                CleanupAgent::activate(
                    index,
                    self.config.clone(),
                    self.clock.clone(),
                    self.store.clone(),
                    self.timers.as_ref(),
                )
            })
            .await
    }

    /// Drops the in-memory activation of agent `index`.
    pub fn deactivate(&self, index: u16) {
        if self.agents.deactivate(&index).is_some() {
            tracing::debug!(index, "cleanup agent deactivated");
        }
    }

    pub fn active_agents(&self) -> Vec<u16> {
        self.agents.keys()
    }

    /// Delivers a timer tick to agent `index`, which calls back into `targets`.
    pub async fn on_timer_fired(
        &self,
        index: u16,
        name: &str,
        tick: TickInfo,
        targets: &dyn CleanupTargets,
    ) -> Result<CleanupReport> {
        let result = match self.agent(index).await {
            Ok(agent) => agent.on_timer_fired(name, tick, targets).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            if e.is_conflict() {
                tracing::warn!(index, error = %e, "cleanup agent superseded, evicting");
                self.deactivate(index);
            }
        }
        result
    }
}

#[async_trait]
impl CleanupRequester for CleanupPool {
    async fn request_cleanup(&self, target: EntityAddress) -> std::result::Result<(), CallError> {
        let index = self.agent_for(&target);
        let address = EntityAddress::cleanup_agent(index);
        let Some(pool) = self.self_ref.upgrade() else {
            return Err(CallError::Unreachable(address));
        };

        self.dispatcher
            .dispatch(&address, async move {
                let result = match pool.agent(index).await {
                    Ok(agent) => agent.request_cleanup(target).await,
                    Err(e) => Err(e),
                };
                if matches!(&result, Err(e) if e.is_conflict()) {
                    pool.deactivate(index);
                }
                result
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::EntityId;
    use runtime::{DispatcherConfig, InMemoryTimerService, ManualClock};
    use state_store::InMemoryStateStore;

    fn pool(pool_size: u16) -> (Arc<CleanupPool>, Arc<CallDispatcher>) {
        let clock = ManualClock::starting_now();
        let timers = Arc::new(InMemoryTimerService::new(Arc::new(clock.clone())));
        let dispatcher = Arc::new(CallDispatcher::new(DispatcherConfig::default()));
        let pool = CleanupPool::new(
            CleanupConfig {
                pool_size,
                ..CleanupConfig::default()
            },
            Arc::new(clock),
            Arc::new(InMemoryStateStore::new()),
            timers,
            dispatcher.clone(),
        );
        (pool, dispatcher)
    }

    #[test]
    fn agent_choice_is_stable_and_in_range() {
        let (pool, _) = pool(8);
        for _ in 0..50 {
            let target = EntityId::new().address();
            let index = pool.agent_for(&target);
            assert!(index < 8);
            assert_eq!(index, pool.agent_for(&target));
        }
    }

    #[test]
    fn agent_choice_follows_the_account_id() {
        let (four, _) = pool(4);
        let id: EntityId = "05000000-0000-4000-8000-000000000000".parse().unwrap();
        assert_eq!(four.agent_for(&id.address()), 1);

        let (single, _) = pool(1);
        assert_eq!(single.agent_for(&id.address()), 0);
    }

    #[tokio::test]
    async fn request_reaches_the_chosen_agent() {
        let (pool, _) = pool(4);
        let target = EntityId::new().address();
        pool.request_cleanup(target.clone()).await.unwrap();

        let agent = pool.agent(pool.agent_for(&target)).await.unwrap();
        assert_eq!(agent.snapshot().queue[0].target, target);
    }

    #[tokio::test]
    async fn unreachable_agent_fails_request() {
        let (pool, dispatcher) = pool(1);
        dispatcher.set_unreachable(&EntityAddress::cleanup_agent(0), true);

        let err = pool
            .request_cleanup(EntityId::new().address())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Unreachable(_)));
    }
}
