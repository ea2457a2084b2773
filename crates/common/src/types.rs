use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an account entity.
///
/// The ordering is the byte order of the underlying UUID. Saga participants
/// are always visited in ascending `EntityId` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns the address of the account with this ID.
    pub fn address(&self) -> EntityAddress {
        EntityAddress::account(*self)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Unique identifier for a transfer or saga transaction.
///
/// Every cross-entity operation is idempotent by this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random transaction ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a transaction ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First byte of the binary form, used to pick a ledger shard.
    pub fn shard_byte(&self) -> u8 {
        self.0.as_bytes()[0]
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for TransactionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// The kinds of entity hosted by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Account,
    LedgerShard,
    CleanupAgent,
}

impl EntityKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::LedgerShard => "ledger-shard",
            EntityKind::CleanupAgent => "cleanup-agent",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Location-transparent reference to any hosted entity.
///
/// Addresses are serializable so they can be stored inside durable state
/// (cleanup queues, timer registrations).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityAddress {
    pub kind: EntityKind,
    pub key: String,
}

impl EntityAddress {
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }

    pub fn account(id: EntityId) -> Self {
        Self::new(EntityKind::Account, id.to_string())
    }

    pub fn ledger_shard(index: u16) -> Self {
        Self::new(EntityKind::LedgerShard, index.to_string())
    }

    pub fn cleanup_agent(index: u16) -> Self {
        Self::new(EntityKind::CleanupAgent, index.to_string())
    }

    /// Parses the key back into an account ID, if this is an account address.
    pub fn as_account(&self) -> Option<EntityId> {
        match self.kind {
            EntityKind::Account => self.key.parse().ok(),
            _ => None,
        }
    }

    /// Parses the key as a pool index, for shard and agent addresses.
    pub fn as_pool_index(&self) -> Option<u16> {
        match self.kind {
            EntityKind::LedgerShard | EntityKind::CleanupAgent => self.key.parse().ok(),
            EntityKind::Account => None,
        }
    }

    /// Stable byte for spreading addresses over a pool: the first UUID byte
    /// of an account, the low byte of a pool index, otherwise the first key
    /// byte.
    pub fn placement_byte(&self) -> u8 {
        if let Some(id) = self.as_account() {
            return id.as_uuid().as_bytes()[0];
        }
        if let Some(index) = self.as_pool_index() {
            return index.to_le_bytes()[0];
        }
        self.key.as_bytes().first().copied().unwrap_or(0)
    }
}

impl std::fmt::Display for EntityAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}
