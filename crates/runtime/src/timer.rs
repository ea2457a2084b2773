//! Durable timers.
//!
//! A timer is keyed by its owner's address and a name. Registrations live in
//! the timer service, not in the owning activation, so an entity that is
//! deactivated keeps receiving ticks and is reactivated to handle them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EntityAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, to_time_delta};

/// Reference to one timer registration.
///
/// The generation changes every time the timer is re-registered, so a stale
/// handle kept in an old state blob cannot cancel a newer registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle {
    pub owner: EntityAddress,
    pub name: String,
    pub generation: u64,
}

/// Information passed to a timer callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// When the timer was first due.
    pub first_tick: DateTime<Utc>,
    /// Interval between ticks.
    pub period: Duration,
    /// The due time this firing corresponds to.
    pub current_tick: DateTime<Utc>,
}

/// Errors returned by a timer service.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Timer {name} needs a non-zero period")]
    InvalidPeriod { name: String },

    #[error("Timer service unavailable: {0}")]
    Unavailable(String),
}

/// Durable timer registry consumed by entities.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Registers a timer, or replaces an existing one with the same owner and name.
    async fn register_or_update(
        &self,
        owner: &EntityAddress,
        name: &str,
        first_delay: Duration,
        period: Duration,
    ) -> Result<TimerHandle, TimerError>;

    /// Cancels a registration. Unknown or stale handles are ignored.
    async fn unregister(&self, handle: &TimerHandle) -> Result<(), TimerError>;

    /// Looks up the live registration for an owner and name.
    async fn registration(
        &self,
        owner: &EntityAddress,
        name: &str,
    ) -> Result<Option<TimerHandle>, TimerError>;
}

#[derive(Debug, Clone)]
struct Registration {
    handle: TimerHandle,
    first_tick: DateTime<Utc>,
    next_due: DateTime<Utc>,
    period: Duration,
}

#[derive(Debug, Default)]
struct TimerTable {
    registrations: HashMap<(EntityAddress, String), Registration>,
    next_generation: u64,
    unavailable: bool,
}

impl TimerTable {
    fn check_available(&self) -> Result<(), TimerError> {
        if self.unavailable {
            return Err(TimerError::Unavailable("timer service is down".to_string()));
        }
        Ok(())
    }
}

/// In-memory timer service driven by a `Clock`.
///
/// Nothing fires on its own: the host polls `due()` and routes each tick to
/// the owning entity. `set_unavailable` makes registration calls fail while
/// due timers keep firing.
#[derive(Clone)]
pub struct InMemoryTimerService {
    clock: Arc<dyn Clock>,
    table: Arc<Mutex<TimerTable>>,
}

impl InMemoryTimerService {
    /// Creates a timer service reading time from the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            table: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    /// Returns every timer whose due time has passed, oldest first, and moves
    /// each one to its next due time. Missed periods collapse into one tick.
    pub fn due(&self) -> Vec<(TimerHandle, TickInfo)> {
        let now = self.clock.now();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        let mut fired = Vec::new();
        for registration in table.registrations.values_mut() {
            if registration.next_due > now {
                continue;
            }
            fired.push((
                registration.handle.clone(),
                TickInfo {
                    first_tick: registration.first_tick,
                    period: registration.period,
                    current_tick: registration.next_due,
                },
            ));
            let period = to_time_delta(registration.period);
            while registration.next_due <= now {
                registration.next_due += period;
            }
        }

        fired.sort_by(|a, b| a.1.current_tick.cmp(&b.1.current_tick));
        fired
    }

    /// Makes every register, unregister and lookup fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    /// Returns the next due time of a registration, if it exists.
    pub fn next_due(&self, owner: &EntityAddress, name: &str) -> Option<DateTime<Utc>> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .registrations
            .get(&(owner.clone(), name.to_string()))
            .map(|r| r.next_due)
    }

    /// Returns the number of live registrations.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .registrations
            .len()
    }

    /// Returns true if there are no live registrations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TimerService for InMemoryTimerService {
    async fn register_or_update(
        &self,
        owner: &EntityAddress,
        name: &str,
        first_delay: Duration,
        period: Duration,
    ) -> Result<TimerHandle, TimerError> {
        if period.is_zero() {
            return Err(TimerError::InvalidPeriod {
                name: name.to_string(),
            });
        }

        let first_tick = self.clock.now() + to_time_delta(first_delay);
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.check_available()?;
        table.next_generation += 1;

        let handle = TimerHandle {
            owner: owner.clone(),
            name: name.to_string(),
            generation: table.next_generation,
        };
        table.registrations.insert(
            (owner.clone(), name.to_string()),
            Registration {
                handle: handle.clone(),
                first_tick,
                next_due: first_tick,
                period,
            },
        );

        tracing::debug!(%owner, name, ?first_delay, ?period, "timer registered");
        Ok(handle)
    }

    async fn unregister(&self, handle: &TimerHandle) -> Result<(), TimerError> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.check_available()?;
        let key = (handle.owner.clone(), handle.name.clone());

        let is_current = table
            .registrations
            .get(&key)
            .is_some_and(|r| r.handle.generation == handle.generation);
        if is_current {
            table.registrations.remove(&key);
            tracing::debug!(owner = %handle.owner, name = %handle.name, "timer unregistered");
        }
        Ok(())
    }

    async fn registration(
        &self,
        owner: &EntityAddress,
        name: &str,
    ) -> Result<Option<TimerHandle>, TimerError> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.check_available()?;
        Ok(table
            .registrations
            .get(&(owner.clone(), name.to_string()))
            .map(|r| r.handle.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn service() -> (InMemoryTimerService, ManualClock) {
        let clock = ManualClock::starting_now();
        (InMemoryTimerService::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn timer_fires_after_first_delay() {
        let (timers, clock) = service();
        let owner = EntityAddress::ledger_shard(1);

        timers
            .register_or_update(&owner, "rotate", Duration::from_secs(60), Duration::from_secs(600))
            .await
            .unwrap();

        assert!(timers.due().is_empty());

        clock.advance(Duration::from_secs(60));
        let fired = timers.due();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0.owner, owner);
        assert_eq!(fired[0].1.period, Duration::from_secs(600));

        // Not due again until a full period has passed
        assert!(timers.due().is_empty());
        clock.advance(Duration::from_secs(600));
        assert_eq!(timers.due().len(), 1);
    }

    #[tokio::test]
    async fn missed_periods_collapse_into_one_tick() {
        let (timers, clock) = service();
        let owner = EntityAddress::cleanup_agent(0);

        timers
            .register_or_update(&owner, "wake", Duration::from_secs(10), Duration::from_secs(10))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(55));
        assert_eq!(timers.due().len(), 1);
        assert!(timers.due().is_empty());

        clock.advance(Duration::from_secs(5));
        assert_eq!(timers.due().len(), 1);
    }

    #[tokio::test]
    async fn stale_handle_does_not_cancel_newer_registration() {
        let (timers, _) = service();
        let owner = EntityAddress::ledger_shard(2);

        let old = timers
            .register_or_update(&owner, "rotate", Duration::ZERO, Duration::from_secs(1))
            .await
            .unwrap();
        let new = timers
            .register_or_update(&owner, "rotate", Duration::ZERO, Duration::from_secs(1))
            .await
            .unwrap();
        assert_ne!(old.generation, new.generation);

        timers.unregister(&old).await.unwrap();
        assert_eq!(timers.registration(&owner, "rotate").await.unwrap(), Some(new.clone()));

        timers.unregister(&new).await.unwrap();
        assert!(timers.is_empty());
    }

    #[tokio::test]
    async fn unavailable_service_rejects_calls_but_keeps_firing() {
        let (timers, clock) = service();
        let owner = EntityAddress::ledger_shard(0);
        let handle = timers
            .register_or_update(&owner, "t", Duration::from_secs(1), Duration::from_secs(1))
            .await
            .unwrap();

        timers.set_unavailable(true);
        assert!(timers.unregister(&handle).await.is_err());
        assert!(timers.registration(&owner, "t").await.is_err());
        clock.advance(Duration::from_secs(1));
        assert_eq!(timers.due().len(), 1);

        timers.set_unavailable(false);
        timers.unregister(&handle).await.unwrap();
        assert!(timers.is_empty());
    }

    #[tokio::test]
    async fn zero_period_is_rejected() {
        let (timers, _) = service();
        let result = timers
            .register_or_update(&EntityAddress::ledger_shard(0), "rotate", Duration::ZERO, Duration::ZERO)
            .await;
        assert!(matches!(result, Err(TimerError::InvalidPeriod { .. })));
    }
}
