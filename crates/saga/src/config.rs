use std::time::Duration;

/// Saga timing settings, all derived from the ledger purge period.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Ledger rotation period.
    pub purge_period: Duration,
}

impl SagaConfig {
    /// How often a participant with an unresolved marker re-checks the ledger.
    /// Half the purge period, so a completion is always seen before it is
    /// rotated out.
    pub fn recovery_period(&self) -> Duration {
        self.purge_period / 2
    }

    /// How long an uncertain outcome is left pending before an absent ledger
    /// entry is taken as failure.
    pub fn settle_window(&self) -> Duration {
        self.purge_period
    }

    /// How long a client may retry a transaction under the same id.
    pub fn retry_window(&self) -> Duration {
        self.purge_period
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            purge_period: Duration::from_secs(120 * 60),
        }
    }
}
