use std::time::Duration;

/// Account settings.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// How long applied transaction ids are remembered.
    pub applied_retention: Duration,
    /// Minimum gap between two cleanup requests from the same account.
    pub cleanup_after: Duration,
    /// Period of the recovery timer. Must stay at or below half the ledger
    /// purge period.
    pub recovery_period: Duration,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            applied_retention: Duration::from_secs(12 * 60 * 60),
            cleanup_after: Duration::from_secs(90 * 60),
            recovery_period: Duration::from_secs(60 * 60),
        }
    }
}
