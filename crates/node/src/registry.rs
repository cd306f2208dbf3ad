//! The read-only node registry boundary.
//!
//! The on-chain registry is an external collaborator; the orchestrator
//! only ever reads the set of active node operators from it and marks the
//! matching peer records as registered. Registered peers are preferred
//! store candidates; unregistered peers remain an accepted last resort.

use alloy_primitives::Address;
use async_trait::async_trait;

/// Failure reported by the registry collaborator.
#[derive(Debug, thiserror::Error)]
#[error("registry failure: {0}")]
pub struct RegistryError(pub String);

/// Read-only view of the external node registry.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// Operator addresses currently registered as active storage nodes.
    async fn active_nodes(&self) -> Result<Vec<Address>, RegistryError>;
}

/// A fixed registry snapshot, for tests and static deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    active: Vec<Address>,
}

impl StaticRegistry {
    /// A registry reporting exactly the given operators as active.
    pub fn new(active: Vec<Address>) -> Self {
        Self { active }
    }
}

#[async_trait]
impl NodeRegistry for StaticRegistry {
    async fn active_nodes(&self) -> Result<Vec<Address>, RegistryError> {
        Ok(self.active.clone())
    }
}
