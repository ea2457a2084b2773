//! A cleanup agent entity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::EntityAddress;
use rand::Rng;
use runtime::{Clock, TickInfo, TimerHandle, TimerService, WriteQueue, to_time_delta};
use serde::{Deserialize, Serialize};
use state_store::StateStore;

use crate::config::CleanupConfig;
use crate::error::Result;
use crate::traits::CleanupTargets;

/// Name of the agent wakeup timer.
pub const WAKEUP_TIMER: &str = "cleanup-wakeup";

/// One queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRequest {
    pub requested_at: DateTime<Utc>,
    pub target: EntityAddress,
}

/// Durable state of an agent. The queue is ordered by `requested_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub queue: VecDeque<CleanupRequest>,
    pub wakeup_timer: Option<TimerHandle>,
}

/// Outcome of one wakeup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub processed: usize,
    pub requeued: usize,
    pub remaining: usize,
}

/// A cleanup agent activation.
///
/// Enqueues interleave with a running wakeup; both only touch the queue in
/// short synchronous sections, enqueues append at the tail and the wakeup
/// takes from the head. Wakeups themselves never overlap.
pub struct CleanupAgent {
    index: u16,
    config: CleanupConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<AgentState>,
    writes: WriteQueue,
    wakeup: tokio::sync::Mutex<()>,
}

impl CleanupAgent {
    /// Loads agent `index`, registering its wakeup timer on first creation.
    #[tracing::instrument(skip(config, clock, store, timers))]
    pub async fn activate(
        index: u16,
        config: CleanupConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore>,
        timers: &dyn TimerService,
    ) -> Result<Self> {
        let address = EntityAddress::cleanup_agent(index);
        let (writes, state) = WriteQueue::load::<AgentState>(address.clone(), store).await?;
        let agent = Self {
            index,
            config,
            clock,
            state: Mutex::new(state.unwrap_or_default()),
            writes,
            wakeup: tokio::sync::Mutex::new(()),
        };

        if agent.lock().wakeup_timer.is_none() {
            let period = agent.config.wakeup_period;
            let handle = timers
                .register_or_update(&address, WAKEUP_TIMER, first_wakeup_delay(period), period)
                .await?;
            agent.lock().wakeup_timer = Some(handle);
            agent.persist().await?;
        }

        Ok(agent)
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    /// Queues `target` for a check once the cleanup cutoff has passed.
    #[tracing::instrument(skip(self), fields(agent = self.index))]
    pub async fn request_cleanup(&self, target: EntityAddress) -> Result<()> {
        let request = CleanupRequest {
            requested_at: self.clock.now(),
            target,
        };
        self.lock().queue.push_back(request.clone());

        if let Err(e) = self.persist().await {
            let mut state = self.lock();
            if let Some(pos) = state.queue.iter().rposition(|r| *r == request) {
                state.queue.remove(pos);
            }
            return Err(e);
        }

        metrics::counter!("cleanup_requests_total").increment(1);
        Ok(())
    }

    /// Handles a timer tick. Only the wakeup timer is recognised.
    pub async fn on_timer_fired(
        &self,
        name: &str,
        tick: TickInfo,
        targets: &dyn CleanupTargets,
    ) -> Result<CleanupReport> {
        if name != WAKEUP_TIMER {
            tracing::debug!(agent = self.index, name, "ignoring unknown timer");
            return Ok(CleanupReport {
                remaining: self.len(),
                ..CleanupReport::default()
            });
        }
        tracing::debug!(agent = self.index, current_tick = %tick.current_tick, "cleanup wakeup");
        self.process_due(targets).await
    }

    /// Calls back every target whose request is older than the cutoff, in
    /// queue order, stopping at the first newer request.
    ///
    /// A target that fails is queued again at the tail with the current time.
    #[tracing::instrument(skip(self, targets), fields(agent = self.index))]
    pub async fn process_due(&self, targets: &dyn CleanupTargets) -> Result<CleanupReport> {
        let _wakeup = self.wakeup.lock().await;
        let cutoff = self.clock.now() - to_time_delta(self.config.cleanup_after);
        let mut report = CleanupReport::default();

        // The request stays queued, and so in every snapshot persisted
        // meanwhile, until its target has answered.
        while let Some(request) = self.peek_older_than(cutoff) {
            match targets.cleanup(&request.target).await {
                Ok(()) => {
                    self.finish(&request, None);
                    report.processed += 1;
                    metrics::counter!("cleanup_processed_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(target = %request.target, error = %e, "cleanup failed, requeueing");
                    self.finish(&request, Some(self.clock.now()));
                    report.requeued += 1;
                }
            }
        }

        if report.processed > 0 || report.requeued > 0 {
            self.persist().await?;
        }
        report.remaining = self.len();

        if report.processed > 0 {
            tracing::info!(
                processed = report.processed,
                requeued = report.requeued,
                remaining = report.remaining,
                "cleanup pass finished"
            );
        }
        Ok(report)
    }

    /// Returns the number of queued requests.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the agent's state.
    pub fn snapshot(&self) -> AgentState {
        self.lock().clone()
    }

    fn peek_older_than(&self, cutoff: DateTime<Utc>) -> Option<CleanupRequest> {
        let state = self.lock();
        state
            .queue
            .front()
            .filter(|request| request.requested_at < cutoff)
            .cloned()
    }

    /// Removes `request` from the head, queueing it again at the tail when
    /// `requeue_at` is set.
    fn finish(&self, request: &CleanupRequest, requeue_at: Option<DateTime<Utc>>) {
        let mut state = self.lock();
        if state.queue.front() == Some(request) {
            state.queue.pop_front();
        }
        if let Some(requested_at) = requeue_at {
            state.queue.push_back(CleanupRequest {
                requested_at,
                target: request.target.clone(),
            });
        }
    }

    async fn persist(&self) -> Result<()> {
        self.writes.write_with(|| self.snapshot()).await?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Random delay in `[1 min, period]`, clamped for short test periods.
fn first_wakeup_delay(period: Duration) -> Duration {
    let max = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
    let min = 60_000u64.min(max);
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}
