use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{EntityAddress, Version};

/// The persisted state blob of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
    /// The entity this state belongs to.
    pub address: EntityAddress,

    /// Storage generation of this blob.
    pub version: Version,

    /// When the blob was written.
    pub timestamp: DateTime<Utc>,

    /// The serialized entity state.
    pub state: serde_json::Value,
}

impl StoredState {
    /// Creates a new stored state record.
    pub fn new(address: EntityAddress, version: Version, state: serde_json::Value) -> Self {
        Self {
            address,
            version,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Deserializes the blob into a concrete state type.
    pub fn into_state<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }

    /// Gets a reference to the blob as JSON.
    pub fn state_ref(&self) -> &serde_json::Value {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::EntityId;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestState {
        balance: i64,
        name: String,
    }

    #[test]
    fn into_state_restores_typed_value() {
        let address = EntityId::new().address();
        let original = TestState {
            balance: 42,
            name: "test".to_string(),
        };

        let stored = StoredState::new(
            address.clone(),
            Version::new(3),
            serde_json::to_value(&original).unwrap(),
        );
        assert_eq!(stored.address, address);
        assert_eq!(stored.state_ref()["balance"], 42);

        let restored: TestState = stored.into_state().unwrap();
        assert_eq!(restored, original);
    }
}
