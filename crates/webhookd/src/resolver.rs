//! Action resolution.
//!
//! Turns a validated webhook request into reads and writes against the
//! backing entity, and normalizes the outcome.
//!
//! `toggle` reads the current state and then writes its negation. The platform
//! offers no compare-and-swap, so two concurrent toggles of the same switch are
//! not linearized: both may read the same state and the last write wins.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::auth::Claims;
use crate::gateway::GatewayError;
use crate::gateway::StateGateway;
use crate::registry::NotFoundError;
use crate::registry::SwitchRegistry;
use crate::state::Attributes;
use crate::state::SwitchState;

/// Attribute recording when a switch was last written through the webhook
pub const TRIGGERED_AT_ATTRIBUTE: &str = "last_triggered_at";

/// Actions a caller may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Toggle,
    Status,
}

/// Decoded body of a webhook request. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub switch_id: String,
    pub action: Action,
    #[serde(default)]
    pub attributes: Option<Attributes>,
}

/// Outcome of a successful action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub switch_id: String,
    pub action: Action,
    pub state: SwitchState,
    pub attributes: Attributes,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Executes actions against the backing entities of registered switches
pub struct ActionResolver {
    registry: Arc<SwitchRegistry>,
    gateway: Arc<dyn StateGateway>,
}

impl ActionResolver {
    pub fn new(registry: Arc<SwitchRegistry>, gateway: Arc<dyn StateGateway>) -> Self {
        Self { registry, gateway }
    }

    pub fn registry(&self) -> &SwitchRegistry {
        &self.registry
    }

    /// Execute `request` on behalf of an authenticated caller.
    ///
    /// Unknown switches fail before the platform is contacted. Platform
    /// failures are returned as-is and never retried.
    pub async fn execute(
        &self,
        request: ActionRequest,
        claims: &Claims,
    ) -> Result<ActionResult, ResolveError> {
        let switch = self.registry.resolve(&request.switch_id)?;
        let entity = switch.entity_name();

        debug!(
            "Executing {} on {} ({}) for issuer {}",
            request.action,
            switch.id,
            entity,
            claims.issuer()
        );

        let attributes = request.attributes;
        let (state, attributes) = match request.action {
            Action::Status => {
                let current = self.gateway.read_state(&entity).await?;
                (current.state, current.attributes)
            }
            Action::On => self.write(&entity, SwitchState::On, attributes).await?,
            Action::Off => self.write(&entity, SwitchState::Off, attributes).await?,
            Action::Toggle => {
                let current = self.gateway.read_state(&entity).await?;
                self.write(&entity, current.state.toggled(), attributes)
                    .await?
            }
        };

        info!(
            "Processed {} for {}, state={}",
            request.action, switch.id, state
        );

        Ok(ActionResult {
            switch_id: switch.id.clone(),
            action: request.action,
            state,
            attributes,
        })
    }

    /// Write `target` with the request attributes plus the trigger timestamp.
    async fn write(
        &self,
        entity: &str,
        target: SwitchState,
        attributes: Option<Attributes>,
    ) -> Result<(SwitchState, Attributes), GatewayError> {
        let mut patch = attributes.unwrap_or_default();
        patch.insert(
            TRIGGERED_AT_ATTRIBUTE.to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );

        match self.gateway.write_state(entity, target, &patch).await? {
            Some(echoed) => Ok((echoed.state, echoed.attributes)),
            None => Ok((target, patch)),
        }
    }
}
