//! Switch registry.
//!
//! The set of switches is fixed at start-up. Every switch is bound to exactly
//! one backing entity at the platform, named `webhook_{id}`.

use std::collections::HashMap;

use thiserror::Error;

/// Icon used when a switch definition does not name one.
pub const DEFAULT_ICON: &str = "mdi:light-switch";

/// Prefix of every backing entity name.
const ENTITY_PREFIX: &str = "webhook_";

/// A logical switch exposed to webhook callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    /// Identifier used in requests (letters, digits and underscore)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Material Design icon shown by the platform
    pub icon: String,
}

impl Switch {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Name of the backing entity at the platform
    pub fn entity_name(&self) -> String {
        entity_name(&self.id)
    }
}

/// Backing entity name for a switch id.
pub fn entity_name(switch_id: &str) -> String {
    format!("{}{}", ENTITY_PREFIX, switch_id)
}

/// Returns true if `id` is non-empty and only contains ASCII letters, digits and underscores.
pub fn is_valid_switch_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Errors raised while building a registry. All of them are fatal at start-up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no switches configured")]
    Empty,

    #[error("duplicate switch id '{0}'")]
    DuplicateId(String),

    #[error("invalid switch id '{0}': only letters, digits and underscores are allowed")]
    InvalidId(String),
}

/// Lookup of an id that is not in the registry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("switch '{0}' is not configured")]
pub struct NotFoundError(pub String);

/// Immutable set of configured switches
#[derive(Debug)]
pub struct SwitchRegistry {
    /// Switches in configuration order
    switches: Vec<Switch>,

    /// Map of switch id -> index into `switches`
    index: HashMap<String, usize>,
}

impl SwitchRegistry {
    /// Build the registry, rejecting empty sets, invalid ids and duplicates.
    pub fn new(switches: Vec<Switch>) -> Result<Self, RegistryError> {
        if switches.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut index = HashMap::with_capacity(switches.len());
        for (i, switch) in switches.iter().enumerate() {
            if !is_valid_switch_id(&switch.id) {
                return Err(RegistryError::InvalidId(switch.id.clone()));
            }
            if index.insert(switch.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(switch.id.clone()));
            }
        }

        Ok(Self { switches, index })
    }

    /// Exact, case-sensitive lookup
    pub fn resolve(&self, switch_id: &str) -> Result<&Switch, NotFoundError> {
        self.index
            .get(switch_id)
            .map(|&i| &self.switches[i])
            .ok_or_else(|| NotFoundError(switch_id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Switch> {
        self.switches.iter()
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SwitchRegistry {
        SwitchRegistry::new(vec![
            Switch::new("doorbell", "Doorbell").with_icon("mdi:bell"),
            Switch::new("garage_door", "Garage Door"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_known_switch() {
        let registry = registry();
        let switch = registry.resolve("doorbell").unwrap();
        assert_eq!(switch.name, "Doorbell");
        assert_eq!(switch.icon, "mdi:bell");
        assert_eq!(switch.entity_name(), "webhook_doorbell");
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let registry = registry();
        assert_eq!(
            registry.resolve("Doorbell"),
            Err(NotFoundError("Doorbell".to_string()))
        );
        assert!(registry.resolve("ghost").is_err());
    }

    #[test]
    fn test_default_icon() {
        let registry = registry();
        assert_eq!(registry.resolve("garage_door").unwrap().icon, DEFAULT_ICON);
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert_eq!(SwitchRegistry::new(vec![]).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SwitchRegistry::new(vec![
            Switch::new("porch", "Porch"),
            Switch::new("porch", "Porch again"),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("porch".to_string()));
    }

    #[test]
    fn test_ids_differing_in_case_are_distinct() {
        let registry = SwitchRegistry::new(vec![
            Switch::new("porch", "Porch"),
            Switch::new("Porch", "Other porch"),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        for id in ["", "front-door", "with space", "dot.ted", "ünicode"] {
            let err = SwitchRegistry::new(vec![Switch::new(id, "x")]).unwrap_err();
            assert_eq!(err, RegistryError::InvalidId(id.to_string()));
        }
    }

    #[test]
    fn test_iter_preserves_order() {
        let registry = registry();
        let ids: Vec<_> = registry.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["doorbell", "garage_door"]);
    }
}
