//! Access to backing entities owned by the home-automation platform.

mod home_assistant;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
pub use home_assistant::HomeAssistantClient;
pub use home_assistant::HomeAssistantConfig;
use thiserror::Error;

use crate::state::Attributes;
use crate::state::EntityState;
use crate::state::SwitchState;

/// Failures talking to the platform. None of them are retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("request to the platform timed out")]
    Timeout,

    #[error("backing entity '{0}' does not exist")]
    NotFound(String),

    #[error("platform unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected response from the platform: {0}")]
    BadResponse(String),
}

/// Trait for reading and writing backing entities
///
/// This trait allows for mocking the platform for testing purposes
#[async_trait]
pub trait StateGateway: Send + Sync {
    /// Read the current state and attributes of a backing entity
    async fn read_state(&self, entity: &str) -> Result<EntityState, GatewayError>;

    /// Set the state of a backing entity and shallow-merge `patch` into its attributes
    ///
    /// Returns the entity as echoed by the platform, or None if the platform
    /// did not echo it.
    async fn write_state(
        &self,
        entity: &str,
        state: SwitchState,
        patch: &Attributes,
    ) -> Result<Option<EntityState>, GatewayError>;
}
