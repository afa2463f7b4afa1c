use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::auth::extract_bearer;
use crate::auth::AuthError;
use crate::auth::Verifier;
use crate::gateway::GatewayError;
use crate::resolver::ActionRequest;
use crate::resolver::ActionResolver;
use crate::resolver::ActionResult;
use crate::resolver::ResolveError;

const SERVICE_NAME: &str = "Home Assistant Incoming Webhook";

/// Response for a successful POST /webhook
#[derive(Serialize)]
struct WebhookResponse {
    status: &'static str,
    #[serde(flatten)]
    result: ActionResult,
}

/// Body of every error response
#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Response for the / endpoint
#[derive(Serialize)]
struct InfoResponse {
    name: &'static str,
    version: String,
    hostname: String,
    status: &'static str,
    switches_configured: usize,
}

/// Response for the /health endpoint
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Failures of a webhook request, mapped onto HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized(AuthError),

    #[error("invalid request body: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Resolve(ResolveError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Resolve(ResolveError::Gateway(e)) => match e {
                GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
                GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                GatewayError::Unreachable(_) | GatewayError::BadResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Unauthorized(cause) => {
                // The caller only learns that it is unauthorized, never why
                warn!("Rejected credential: {}", cause);
                let body = ErrorResponse {
                    status: "error",
                    error: self.to_string(),
                    details: None,
                };
                return (status, [(WWW_AUTHENTICATE, "Bearer")], Json(body)).into_response();
            }
            ApiError::BadRequest(details) => ErrorResponse {
                status: "error",
                error: "invalid request body".to_string(),
                details: Some(details.clone()),
            },
            ApiError::Resolve(ResolveError::NotFound(e)) => {
                warn!("{}", e);
                ErrorResponse {
                    status: "error",
                    error: e.to_string(),
                    details: None,
                }
            }
            ApiError::Resolve(ResolveError::Gateway(e @ GatewayError::NotFound(_))) => {
                warn!("{}", e);
                ErrorResponse {
                    status: "error",
                    error: e.to_string(),
                    details: Some("create it as an input_boolean helper in Home Assistant".to_string()),
                }
            }
            ApiError::Resolve(ResolveError::Gateway(e)) => {
                error!("Error processing webhook request: {}", e);
                ErrorResponse {
                    status: "error",
                    error: "platform request failed".to_string(),
                    details: Some(e.to_string()),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Shared application state
pub struct AppState {
    version: &'static str,
    verifier: Verifier,
    resolver: ActionResolver,
}

impl AppState {
    pub fn new(verifier: Verifier, resolver: ActionResolver) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            verifier,
            resolver,
        }
    }
}

/// Handler for POST /webhook
///
/// The credential is checked before the body is decoded, so an unauthenticated
/// caller learns nothing about the request format or the configured switches.
#[tracing::instrument(skip_all)]
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let claims = extract_bearer(header)
        .and_then(|token| state.verifier.verify(token))
        .map_err(ApiError::Unauthorized)?;

    let request: ActionRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    info!(
        "Webhook called: switch_id={}, action={}, issuer={}",
        request.switch_id,
        request.action,
        claims.issuer()
    );

    let result = state.resolver.execute(request, &claims).await?;

    Ok(Json(WebhookResponse {
        status: "success",
        result,
    }))
}

/// Handler for GET /
#[tracing::instrument(skip(state))]
async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling / request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            name: SERVICE_NAME,
            version: state.version.to_string(),
            hostname,
            status: "running",
            switches_configured: state.resolver.registry().len(),
        }),
    )
}

/// Handler for GET /health
#[tracing::instrument]
async fn health() -> impl IntoResponse {
    tracing::debug!("Handling /health request");
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "0.0.0.0")
/// * `port` - The port to listen on (e.g., 8099)
/// * `state` - Verifier and resolver shared by all requests
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: &str,
    port: u16,
    state: AppState,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::Request;
    use secrecy::SecretString;
    use serde_json::json;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::tests::expired_token;
    use crate::auth::tests::sign;
    use crate::auth::tests::valid_token;
    use crate::auth::tests::SECRET;
    use crate::gateway::mock::MockGateway;
    use crate::registry::Switch;
    use crate::registry::SwitchRegistry;
    use crate::resolver::TRIGGERED_AT_ATTRIBUTE;
    use crate::state::SwitchState;

    fn app(gateway: MockGateway) -> (Router, Arc<MockGateway>) {
        let registry = SwitchRegistry::new(vec![
            Switch::new("doorbell", "Doorbell"),
            Switch::new("garage", "Garage"),
        ])
        .unwrap();
        let gateway = Arc::new(gateway);
        let state = AppState::new(
            Verifier::new(&SecretString::from(SECRET)),
            ActionResolver::new(Arc::new(registry), gateway.clone()),
        );
        (create_router(Arc::new(state)), gateway)
    }

    fn doorbell(state: SwitchState) -> MockGateway {
        MockGateway::new().with_entity("webhook_doorbell", state, json!({"source": "camera"}))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn post_webhook(app: Router, token: Option<&str>, body: &str) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        send(app, builder.body(Body::from(body.to_string())).unwrap()).await
    }

    fn parse(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(MockGateway::new());
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse(&body), json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_info() {
        let (app, _) = app(MockGateway::new());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = parse(&body);
        assert_eq!(body["name"], SERVICE_NAME);
        assert_eq!(body["status"], "running");
        assert_eq!(body["switches_configured"], 2);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_on_with_attributes() {
        let (app, _) = app(doorbell(SwitchState::Off));
        let token = valid_token();

        let (status, body) = post_webhook(
            app,
            Some(&token),
            r#"{"switch_id": "doorbell", "action": "on", "attributes": {"user": "alice"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let mut body = parse(&body);
        assert!(body["attributes"][TRIGGERED_AT_ATTRIBUTE].is_string());
        body["attributes"]
            .as_object_mut()
            .unwrap()
            .remove(TRIGGERED_AT_ATTRIBUTE);
        assert_eq!(
            body,
            json!({
                "status": "success",
                "switch_id": "doorbell",
                "action": "on",
                "state": "on",
                "attributes": {"user": "alice", "source": "camera"},
            })
        );
    }

    #[tokio::test]
    async fn test_toggle() {
        let (app, gateway) = app(doorbell(SwitchState::On));
        let token = valid_token();

        let (status, body) =
            post_webhook(app, Some(&token), r#"{"switch_id": "doorbell", "action": "toggle"}"#)
                .await;

        assert_eq!(status, StatusCode::OK);
        let body = parse(&body);
        assert_eq!(body["action"], "toggle");
        assert_eq!(body["state"], "off");
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_status() {
        let (app, _) = app(doorbell(SwitchState::On));
        let token = valid_token();

        let (status, body) =
            post_webhook(app, Some(&token), r#"{"switch_id": "doorbell", "action": "status"}"#)
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            parse(&body),
            json!({
                "status": "success",
                "switch_id": "doorbell",
                "action": "status",
                "state": "on",
                "attributes": {"source": "camera"},
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_fields_ignored() {
        let (app, _) = app(doorbell(SwitchState::On));
        let token = valid_token();

        let (status, _) = post_webhook(
            app,
            Some(&token),
            r#"{"switch_id": "doorbell", "action": "status", "priority": "high"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (app, gateway) = app(doorbell(SwitchState::On));

        let (status, body) =
            post_webhook(app, None, r#"{"switch_id": "doorbell", "action": "on"}"#).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        insta::assert_snapshot!(body, @r#"{"status":"error","error":"unauthorized"}"#);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_every_auth_failure_looks_the_same() {
        let wrong_secret = sign("another-secret-that-is-also-long-enough", None, Some(u64::MAX));
        let tokens = [
            "invalid-token".to_string(),
            wrong_secret,
            expired_token(),
        ];

        let mut bodies = Vec::new();
        for token in &tokens {
            let (app, _) = app(doorbell(SwitchState::On));
            let (status, body) =
                post_webhook(app, Some(token), r#"{"switch_id": "doorbell", "action": "on"}"#)
                    .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            bodies.push(body);
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_expired_credential_short_circuits() {
        let (app, gateway) = app(MockGateway::new());
        let token = expired_token();

        // An unknown switch would be a 404 if the lookup ran
        let (status, _) =
            post_webhook(app, Some(&token), r#"{"switch_id": "ghost", "action": "on"}"#).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_credential_checked_before_body() {
        let (app, _) = app(MockGateway::new());

        let (status, _) = post_webhook(app, None, "not json").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let token = valid_token();
        for body in [
            "not json",
            r#"{"switch_id": "doorbell", "action": "invalid_action"}"#,
            r#"{"action": "on"}"#,
            r#"{"switch_id": "doorbell"}"#,
            r#"{"switch_id": "doorbell", "action": "on", "attributes": "loud"}"#,
        ] {
            let (app, gateway) = app(doorbell(SwitchState::On));
            let (status, response) = post_webhook(app, Some(&token), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(parse(&response)["error"], "invalid request body");
            assert!(gateway.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unknown_switch() {
        let (app, gateway) = app(doorbell(SwitchState::On));
        let token = valid_token();

        let (status, body) =
            post_webhook(app, Some(&token), r#"{"switch_id": "ghost", "action": "on"}"#).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(parse(&body)["error"], "switch 'ghost' is not configured");
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_backing_entity() {
        let (app, _) = app(MockGateway::new());
        let token = valid_token();

        let (status, body) =
            post_webhook(app, Some(&token), r#"{"switch_id": "doorbell", "action": "on"}"#).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            parse(&body)["error"],
            "backing entity 'webhook_doorbell' does not exist"
        );
    }

    #[tokio::test]
    async fn test_platform_failures() {
        let token = valid_token();
        for (err, expected) in [
            (GatewayError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (
                GatewayError::Unreachable("connection refused".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::BadResponse("HTTP 500 Internal Server Error".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ] {
            let (app, _) = app(doorbell(SwitchState::On).failing(err));
            let (status, body) =
                post_webhook(app, Some(&token), r#"{"switch_id": "doorbell", "action": "off"}"#)
                    .await;
            assert_eq!(status, expected);
            assert_eq!(parse(&body)["status"], "error");
        }
    }
}
