//! Start-up check of backing entities.
//!
//! Backing entities cannot be created programmatically, only detected. A
//! missing entity is reported and the switch keeps failing with a not-found
//! error until an operator creates it; serving is never blocked.

use tracing::info;
use tracing::warn;

use crate::gateway::GatewayError;
use crate::gateway::StateGateway;
use crate::registry::SwitchRegistry;

/// Result of checking one switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupCheck {
    pub switch_id: String,
    pub backing_entity_found: bool,
}

/// Read the backing entity of every registered switch once
pub async fn check_all(registry: &SwitchRegistry, gateway: &dyn StateGateway) -> Vec<StartupCheck> {
    info!("Checking backing entities for {} switches", registry.len());

    let mut checks = Vec::with_capacity(registry.len());
    for switch in registry.iter() {
        let entity = switch.entity_name();
        let found = match gateway.read_state(&entity).await {
            Ok(state) => {
                info!("Switch '{}' found ({}: {})", switch.id, entity, state.state);
                true
            }
            Err(GatewayError::NotFound(_)) => {
                warn!(
                    "Switch '{}' has no backing entity; create an input_boolean named '{}' \
                     (icon {}) in Home Assistant",
                    switch.id, entity, switch.icon
                );
                false
            }
            Err(e) => {
                warn!("Could not check switch '{}': {}", switch.id, e);
                false
            }
        };

        checks.push(StartupCheck {
            switch_id: switch.id.clone(),
            backing_entity_found: found,
        });
    }

    let missing = checks.iter().filter(|c| !c.backing_entity_found).count();
    if missing > 0 {
        warn!("{} of {} switches are not ready", missing, checks.len());
    } else {
        info!("All switches ready");
    }

    checks
}
