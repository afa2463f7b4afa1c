use serde::Deserialize;
use serde::Serialize;

/// Free-form attributes attached to a backing entity.
///
/// Backed by `serde_json::Map`, so keys serialize in sorted order.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Boolean state of a backing entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// The opposite state.
    pub fn toggled(self) -> Self {
        match self {
            SwitchState::On => SwitchState::Off,
            SwitchState::Off => SwitchState::On,
        }
    }
}

/// Snapshot of a backing entity as reported by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub state: SwitchState,
    pub attributes: Attributes,
}
