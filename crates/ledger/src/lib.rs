//! Transaction status ledger.
//!
//! The last participant of a saga records the transaction here; any
//! participant recovering from a crash asks the ledger whether the transaction
//! completed. Entries are spread over a fixed pool of shards, and each shard
//! keeps a current and an archive generation that rotate on a durable timer.

pub mod config;
pub mod error;
pub mod pool;
pub mod shard;
pub mod status;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use pool::TransactionLedger;
pub use shard::{LedgerShard, ROTATION_TIMER, ShardState};
pub use status::TransactionStatus;
