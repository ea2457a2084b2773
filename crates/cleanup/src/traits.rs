//! Seams between cleanup agents and the entities they serve.

use async_trait::async_trait;
use common::EntityAddress;
use runtime::CallError;

/// Accepts cleanup requests. Implemented by the agent pool.
#[async_trait]
pub trait CleanupRequester: Send + Sync {
    /// Queues a future consistency check of `target`. Duplicates are harmless.
    async fn request_cleanup(&self, target: EntityAddress) -> Result<(), CallError>;
}

/// Runs the idempotent reconciliation of a target entity.
#[async_trait]
pub trait CleanupTargets: Send + Sync {
    async fn cleanup(&self, target: &EntityAddress) -> Result<(), CallError>;
}
