//! Accounts that take part in pairwise transfers and chained sagas.

pub mod applied;
pub mod config;
pub mod directory;
pub mod entity;
pub mod peers;
pub mod state;

pub use applied::{AppliedTransactions, Outcome};
pub use config::AccountConfig;
pub use directory::AccountDirectory;
pub use entity::{Account, AccountServices, RECOVERY_TIMER};
pub use peers::AccountPeers;
pub use state::{AccountState, InFlightTransfer};
