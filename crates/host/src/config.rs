//! Host configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use cleanup::CleanupConfig;
use domain::AccountConfig;
use ledger::LedgerConfig;
use runtime::DispatcherConfig;
use saga::SagaConfig;

/// Host configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LEDGER_POOL_SIZE` (256), `LEDGER_PURGE_PERIOD_SECS` (7200)
/// - `CLEANUP_POOL_SIZE` (1), `CLEANUP_AFTER_SECS` (5400), `CLEANUP_WAKEUP_SECS` (1800)
/// - `APPLIED_RETENTION_SECS` (43200)
/// - `CALL_TIMEOUT_MS` (5000), `TIMER_POLL_MS` (1000)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub ledger_pool_size: u16,
    pub purge_period: Duration,
    pub cleanup_pool_size: u16,
    pub cleanup_after: Duration,
    pub cleanup_wakeup: Duration,
    pub applied_retention: Duration,
    pub call_timeout: Duration,
    pub timer_poll: Duration,
}

impl HostConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());
        let secs = |key: &str, default: Duration| parsed(key).map_or(default, Duration::from_secs);
        let millis =
            |key: &str, default: Duration| parsed(key).map_or(default, Duration::from_millis);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            ledger_pool_size: parse_or(lookup("LEDGER_POOL_SIZE"), defaults.ledger_pool_size),
            purge_period: secs("LEDGER_PURGE_PERIOD_SECS", defaults.purge_period),
            cleanup_pool_size: parse_or(lookup("CLEANUP_POOL_SIZE"), defaults.cleanup_pool_size),
            cleanup_after: secs("CLEANUP_AFTER_SECS", defaults.cleanup_after),
            cleanup_wakeup: secs("CLEANUP_WAKEUP_SECS", defaults.cleanup_wakeup),
            applied_retention: secs("APPLIED_RETENTION_SECS", defaults.applied_retention),
            call_timeout: millis("CALL_TIMEOUT_MS", defaults.call_timeout),
            timer_poll: millis("TIMER_POLL_MS", defaults.timer_poll),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            pool_size: self.ledger_pool_size,
            purge_period: self.purge_period,
        }
    }

    pub fn cleanup_config(&self) -> CleanupConfig {
        CleanupConfig {
            pool_size: self.cleanup_pool_size,
            cleanup_after: self.cleanup_after,
            wakeup_period: self.cleanup_wakeup,
        }
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            purge_period: self.purge_period,
        }
    }

    /// Account settings. The recovery period is always half the purge period.
    pub fn account_config(&self) -> AccountConfig {
        AccountConfig {
            applied_retention: self.applied_retention,
            cleanup_after: self.cleanup_after,
            recovery_period: self.saga_config().recovery_period(),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            call_timeout: self.call_timeout,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            ledger_pool_size: LedgerConfig::DEFAULT_POOL_SIZE,
            purge_period: LedgerConfig::DEFAULT_PURGE_PERIOD,
            cleanup_pool_size: 1,
            cleanup_after: Duration::from_secs(90 * 60),
            cleanup_wakeup: Duration::from_secs(30 * 60),
            applied_retention: Duration::from_secs(12 * 60 * 60),
            call_timeout: Duration::from_secs(5),
            timer_poll: Duration::from_secs(1),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
