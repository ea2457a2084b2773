//! Ledger configuration.

use std::time::Duration;

use common::TransactionId;

/// Ledger settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Number of shards in the pool.
    pub pool_size: u16,
    /// Rotation period. An entry is remembered for at least one period and
    /// forgotten after two.
    pub purge_period: Duration,
}

impl LedgerConfig {
    /// Default pool size, sized for roughly 2000 completions per second.
    pub const DEFAULT_POOL_SIZE: u16 = 256;

    /// Default rotation period (120 minutes).
    pub const DEFAULT_PURGE_PERIOD: Duration = Duration::from_secs(120 * 60);

    /// Returns the shard index that owns `id`.
    pub fn shard_for(&self, id: TransactionId) -> u16 {
        u16::from(id.shard_byte()) % self.pool_size.max(1)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            pool_size: Self::DEFAULT_POOL_SIZE,
            purge_period: Self::DEFAULT_PURGE_PERIOD,
        }
    }
}
