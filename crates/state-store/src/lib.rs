pub mod error;
pub mod memory;
pub mod record;
pub mod store;
pub mod version;

pub use common::EntityAddress;
pub use error::{Result, StorageError};
pub use memory::InMemoryStateStore;
pub use record::StoredState;
pub use store::{StateStore, StateStoreExt};
pub use version::Version;
