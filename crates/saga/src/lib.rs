//! Chained multi-party transactions.
//!
//! A saga is an id plus participants sorted by entity id. Participant `i`
//! commits its delta locally, then invokes participant `i + 1`; the last
//! participant records the transaction in the status ledger. A refusal
//! unwinds the chain with compensating rollbacks. A lost call is settled by
//! asking the ledger, never by guessing.

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod participants;
pub mod pending;
pub mod transaction;

pub use builder::TransactionBuilder;
pub use config::SagaConfig;
pub use coordinator::{ForwardOutcome, Resolution, SagaCoordinator};
pub use error::{Result, SagaError};
pub use participants::TransactionParticipants;
pub use pending::PendingTransaction;
pub use transaction::{Participant, SagaTransaction};
