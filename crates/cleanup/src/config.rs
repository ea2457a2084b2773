use std::time::Duration;

/// Cleanup agent settings.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Number of agents in the pool.
    pub pool_size: u16,
    /// Requests younger than this are left in the queue.
    pub cleanup_after: Duration,
    /// Interval between agent wakeups.
    pub wakeup_period: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            cleanup_after: Duration::from_secs(90 * 60),
            wakeup_period: Duration::from_secs(30 * 60),
        }
    }
}
