//! Cleanup driven end to end through the wakeup timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cleanup::{CleanupConfig, CleanupPool, CleanupRequester, CleanupTargets, WAKEUP_TIMER};
use common::{EntityAddress, EntityId};
use runtime::{CallDispatcher, CallError, DispatcherConfig, InMemoryTimerService, ManualClock};
use state_store::InMemoryStateStore;

#[derive(Default)]
struct Recorder {
    cleaned: Mutex<Vec<EntityAddress>>,
}

#[async_trait]
impl CleanupTargets for Recorder {
    async fn cleanup(&self, target: &EntityAddress) -> Result<(), CallError> {
        self.cleaned.lock().unwrap().push(target.clone());
        Ok(())
    }
}

struct Harness {
    clock: ManualClock,
    timers: Arc<InMemoryTimerService>,
    pool: Arc<CleanupPool>,
    targets: Recorder,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::starting_now();
        let timers = Arc::new(InMemoryTimerService::new(Arc::new(clock.clone())));
        let pool = CleanupPool::new(
            CleanupConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(InMemoryStateStore::new()),
            timers.clone(),
            Arc::new(CallDispatcher::new(DispatcherConfig::default())),
        );
        Self {
            clock,
            timers,
            pool,
            targets: Recorder::default(),
        }
    }

    async fn advance(&self, by: Duration) {
        self.clock.advance(by);
        for (handle, tick) in self.timers.due() {
            assert_eq!(handle.name, WAKEUP_TIMER);
            let index = handle.owner.as_pool_index().unwrap();
            self.pool
                .on_timer_fired(index, &handle.name, tick, &self.targets)
                .await
                .unwrap();
        }
    }

    fn cleaned(&self) -> Vec<EntityAddress> {
        self.targets.cleaned.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn stale_request_is_cleaned_on_a_later_wakeup() {
    let h = Harness::new();
    let target = EntityId::new().address();
    h.pool.request_cleanup(target.clone()).await.unwrap();

    // Wakeups inside the cutoff leave the request queued
    h.advance(Duration::from_secs(60 * 60)).await;
    assert!(h.cleaned().is_empty());

    h.advance(Duration::from_secs(60 * 60)).await;
    assert_eq!(h.cleaned(), vec![target]);

    let agent = h.pool.agent(0).await.unwrap();
    assert!(agent.is_empty());
}

#[tokio::test]
async fn duplicate_requests_are_each_delivered() {
    let h = Harness::new();
    let target = EntityId::new().address();
    h.pool.request_cleanup(target.clone()).await.unwrap();
    h.pool.request_cleanup(target.clone()).await.unwrap();

    h.advance(Duration::from_secs(3 * 60 * 60)).await;
    assert_eq!(h.cleaned(), vec![target.clone(), target]);
}

#[tokio::test]
async fn queue_survives_agent_deactivation() {
    let h = Harness::new();
    let target = EntityId::new().address();
    h.pool.request_cleanup(target.clone()).await.unwrap();
    h.pool.deactivate(0);

    h.advance(Duration::from_secs(3 * 60 * 60)).await;
    assert_eq!(h.cleaned(), vec![target]);
}
