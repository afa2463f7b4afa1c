//! Home Assistant REST API client.
//!
//! Backing entities are `input_boolean` helpers. They cannot be created over
//! the REST API, so this client only ever reads and updates existing ones.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use super::GatewayError;
use super::StateGateway;
use crate::state::Attributes;
use crate::state::EntityState;
use crate::state::SwitchState;

/// Domain of every backing entity
const DOMAIN: &str = "input_boolean";

/// Connection settings for Home Assistant
#[derive(Debug)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. "http://supervisor/core"
    pub url: String,

    /// Long-lived access token or supervisor token
    pub token: SecretString,

    /// Upper bound for every outbound request
    pub timeout: Duration,
}

/// State object as returned by `/api/states/<entity_id>`
#[derive(Debug, Deserialize)]
struct StateObject {
    state: String,
    #[serde(default)]
    attributes: Attributes,
}

/// Attributes of a state object, whatever its current state
#[derive(Debug, Deserialize)]
struct AttributesOnly {
    #[serde(default)]
    attributes: Attributes,
}

/// Real gateway implementation using reqwest
pub struct HomeAssistantClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl HomeAssistantClient {
    /// Create a new client from configuration
    pub fn new(config: HomeAssistantConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn entity_id(entity: &str) -> String {
        format!("{}.{}", DOMAIN, entity)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Send an authenticated request, mapping transport failures and error statuses
    async fn send(&self, request: RequestBuilder, entity_id: &str) -> Result<Response, GatewayError> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound(entity_id.to_string())),
            status if !status.is_success() => {
                Err(GatewayError::BadResponse(format!("HTTP {}", status)))
            }
            _ => Ok(response),
        }
    }

    /// Current attributes of `entity_id`. The state itself may be anything,
    /// including `unavailable`, so that an explicit write can recover the entity.
    async fn read_attributes(&self, entity_id: &str) -> Result<Attributes, GatewayError> {
        let request = self.http.get(self.url(&format!("states/{}", entity_id)));

        let body = self
            .send(request, entity_id)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;

        serde_json::from_slice::<AttributesOnly>(&body)
            .map(|object| object.attributes)
            .map_err(|e| GatewayError::BadResponse(format!("invalid state object: {}", e)))
    }

    async fn call_service(&self, state: SwitchState, entity_id: &str) -> Result<(), GatewayError> {
        let service = match state {
            SwitchState::On => "turn_on",
            SwitchState::Off => "turn_off",
        };
        let request = self
            .http
            .post(self.url(&format!("services/{}/{}", DOMAIN, service)))
            .json(&json!({ "entity_id": entity_id }));

        self.send(request, entity_id).await?;
        debug!("Called {}.{} for {}", DOMAIN, service, entity_id);
        Ok(())
    }
}

#[async_trait]
impl StateGateway for HomeAssistantClient {
    async fn read_state(&self, entity: &str) -> Result<EntityState, GatewayError> {
        let entity_id = Self::entity_id(entity);
        let request = self.http.get(self.url(&format!("states/{}", entity_id)));

        let body = self
            .send(request, &entity_id)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;

        parse_entity(&body)
    }

    async fn write_state(
        &self,
        entity: &str,
        state: SwitchState,
        patch: &Attributes,
    ) -> Result<Option<EntityState>, GatewayError> {
        let entity_id = Self::entity_id(entity);

        // The states endpoint replaces the attribute set, so merge onto the current one.
        // This is a second GET when toggling; the resolver's read only decides the target.
        let mut attributes = self.read_attributes(&entity_id).await?;
        for (key, value) in patch {
            attributes.insert(key.clone(), value.clone());
        }

        self.call_service(state, &entity_id).await?;

        let request = self
            .http
            .post(self.url(&format!("states/{}", entity_id)))
            .json(&json!({ "state": state, "attributes": attributes }));

        let body = match self.send(request, &entity_id).await {
            Ok(response) => response.bytes().await.map_err(transport_error),
            Err(e) => Err(e),
        }
        .inspect_err(|e| {
            warn!(
                "{} was turned {} but its attributes were not updated: {}",
                entity_id, state, e
            )
        })?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        parse_entity(&body).map(Some)
    }
}

fn parse_entity(body: &[u8]) -> Result<EntityState, GatewayError> {
    let object: StateObject = serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadResponse(format!("invalid state object: {}", e)))?;

    let state = object
        .state
        .parse::<SwitchState>()
        .map_err(|_| GatewayError::BadResponse(format!("unexpected state '{}'", object.state)))?;

    Ok(EntityState {
        state,
        attributes: object.attributes,
    })
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else if e.is_decode() {
        GatewayError::BadResponse(e.to_string())
    } else {
        GatewayError::Unreachable(e.to_string())
    }
}
