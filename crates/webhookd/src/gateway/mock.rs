use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Barrier;

use super::GatewayError;
use super::StateGateway;
use crate::state::Attributes;
use crate::state::EntityState;
use crate::state::SwitchState;

/// A call received by the mock gateway
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Read(String),
    Write {
        entity: String,
        state: SwitchState,
        patch: Attributes,
    },
}

/// In-memory gateway for testing
pub struct MockGateway {
    entities: Mutex<HashMap<String, EntityState>>,
    calls: Mutex<Vec<Call>>,
    failure: Option<GatewayError>,
    echo: bool,
    read_barrier: Option<Arc<Barrier>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            entities: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failure: None,
            echo: true,
            read_barrier: None,
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backing entity
    pub fn with_entity(self, entity: &str, state: SwitchState, attributes: serde_json::Value) -> Self {
        let attributes = match attributes {
            serde_json::Value::Object(map) => map,
            _ => Attributes::new(),
        };
        self.entities
            .lock()
            .unwrap()
            .insert(entity.to_string(), EntityState { state, attributes });
        self
    }

    /// Fail every call with `err`
    pub fn failing(mut self, err: GatewayError) -> Self {
        self.failure = Some(err);
        self
    }

    /// Accept writes without echoing the entity back
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Hold every read until `readers` reads have taken their snapshot
    pub fn with_read_barrier(mut self, readers: usize) -> Self {
        self.read_barrier = Some(Arc::new(Barrier::new(readers)));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn entity(&self, entity: &str) -> Option<EntityState> {
        self.entities.lock().unwrap().get(entity).cloned()
    }
}

#[async_trait]
impl StateGateway for MockGateway {
    async fn read_state(&self, entity: &str) -> Result<EntityState, GatewayError> {
        self.calls.lock().unwrap().push(Call::Read(entity.to_string()));

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let result = self
            .entities
            .lock()
            .unwrap()
            .get(entity)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(entity.to_string()));

        if let Some(barrier) = &self.read_barrier {
            barrier.wait().await;
        }
        result
    }

    async fn write_state(
        &self,
        entity: &str,
        state: SwitchState,
        patch: &Attributes,
    ) -> Result<Option<EntityState>, GatewayError> {
        self.calls.lock().unwrap().push(Call::Write {
            entity: entity.to_string(),
            state,
            patch: patch.clone(),
        });

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let mut entities = self.entities.lock().unwrap();
        let current = entities
            .get_mut(entity)
            .ok_or_else(|| GatewayError::NotFound(entity.to_string()))?;

        current.state = state;
        for (key, value) in patch {
            current.attributes.insert(key.clone(), value.clone());
        }

        Ok(self.echo.then(|| current.clone()))
    }
}
