//! Account entities for atomic multi-party transfers.
//!
//! This crate provides:
//! - `Holdings` and `Delta`, the quantities an account owns and the changes
//!   applied to them
//! - `Wallet`, holdings of currency and goods
//! - `Account`, an entity supporting a two-party idempotent handshake and
//!   participation in chained sagas
//! - `AccountDirectory`, which activates accounts and routes calls to them

pub mod account;
pub mod error;
pub mod holdings;
pub mod wallet;

pub use account::{
    Account, AccountConfig, AccountDirectory, AccountPeers, AccountServices, AccountState,
    AppliedTransactions, InFlightTransfer, Outcome, RECOVERY_TIMER,
};
pub use error::{AccountError, Result};
pub use holdings::{Delta, Holdings};
pub use wallet::{Wallet, WalletDelta};
