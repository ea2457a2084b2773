//! Cross-entity call dispatch.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use common::EntityAddress;
use thiserror::Error;

/// Failure of a cross-entity call.
///
/// None of these tell the caller whether the target applied the call. A
/// caller must re-derive the outcome (retry the idempotent call, or ask the
/// status ledger) instead of assuming success or failure.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("Entity {0} is unreachable")]
    Unreachable(EntityAddress),

    #[error("Call to {target} timed out after {after:?}")]
    Timeout {
        target: EntityAddress,
        after: Duration,
    },

    #[error("Call to {target} failed: {reason}")]
    Failed {
        target: EntityAddress,
        reason: String,
    },
}

impl CallError {
    /// Returns the address the failed call was sent to.
    pub fn target(&self) -> &EntityAddress {
        match self {
            CallError::Unreachable(target) => target,
            CallError::Timeout { target, .. } | CallError::Failed { target, .. } => target,
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long a caller waits for any single call.
    pub call_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: HashSet<EntityAddress>,
    delays: HashMap<EntityAddress, Duration>,
}

/// Runs calls against entities with a caller-side timeout.
///
/// Each call is spawned as its own task, so a call the caller gave up on still
/// runs to completion on the target: dispatch is at-most-once, never
/// half-applied. Faults can be injected per target address.
#[derive(Debug, Default)]
pub struct CallDispatcher {
    config: DispatcherConfig,
    faults: RwLock<Faults>,
}

impl CallDispatcher {
    /// Creates a dispatcher with the given settings.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            faults: RwLock::new(Faults::default()),
        }
    }

    /// Returns the caller-side timeout.
    pub fn call_timeout(&self) -> Duration {
        self.config.call_timeout
    }

    /// Makes calls to `target` fail immediately with `Unreachable`.
    pub fn set_unreachable(&self, target: &EntityAddress, unreachable: bool) {
        let mut faults = self.faults.write().unwrap_or_else(PoisonError::into_inner);
        if unreachable {
            faults.unreachable.insert(target.clone());
        } else {
            faults.unreachable.remove(target);
        }
    }

    /// Delays delivery of every call to `target`, or clears the delay.
    pub fn set_delay(&self, target: &EntityAddress, delay: Option<Duration>) {
        let mut faults = self.faults.write().unwrap_or_else(PoisonError::into_inner);
        match delay {
            Some(delay) => {
                faults.delays.insert(target.clone(), delay);
            }
            None => {
                faults.delays.remove(target);
            }
        }
    }

    /// Clears every injected fault.
    pub fn heal(&self) {
        let mut faults = self.faults.write().unwrap_or_else(PoisonError::into_inner);
        faults.unreachable.clear();
        faults.delays.clear();
    }

    /// Sends a call to `target` and waits for its result.
    ///
    /// An error returned by the target itself is reported as `CallError::Failed`.
    pub async fn dispatch<T, E, Fut>(&self, target: &EntityAddress, call: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        match self.dispatch_result(target, call).await? {
            Ok(value) => Ok(value),
            Err(e) => Err(CallError::Failed {
                target: target.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Like `dispatch`, but hands the target's own error back unchanged.
    ///
    /// The outer `Err` is a delivery failure; the inner one came from the target.
    pub async fn dispatch_result<T, E, Fut>(
        &self,
        target: &EntityAddress,
        call: Fut,
    ) -> Result<Result<T, E>, CallError>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let delay = {
            let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
            if faults.unreachable.contains(target) {
                metrics::counter!("calls_unreachable_total").increment(1);
                return Err(CallError::Unreachable(target.clone()));
            }
            faults.delays.get(target).copied()
        };

        let task = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            call.await
        });

        match tokio::time::timeout(self.config.call_timeout, task).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_error)) => Err(CallError::Failed {
                target: target.clone(),
                reason: join_error.to_string(),
            }),
            Err(_) => {
                metrics::counter!("calls_timed_out_total").increment(1);
                tracing::warn!(%target, timeout = ?self.config.call_timeout, "call timed out");
                Err(CallError::Timeout {
                    target: target.clone(),
                    after: self.config.call_timeout,
                })
            }
        }
    }
}
