//! Deferred cleanup.
//!
//! An entity that leaves an in-flight record behind asks a cleanup agent to
//! check on it later. Agents keep a time-ordered queue and, on each wakeup,
//! call back every target whose request is older than the cleanup cutoff.

pub mod agent;
pub mod config;
pub mod error;
pub mod pool;
pub mod traits;

pub use agent::{AgentState, CleanupAgent, CleanupReport, CleanupRequest, WAKEUP_TIMER};
pub use config::CleanupConfig;
pub use error::{CleanupError, Result};
pub use pool::CleanupPool;
pub use traits::{CleanupRequester, CleanupTargets};
