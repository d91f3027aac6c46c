//! Axum webhook endpoint.
//!
//! Every method is routed to the controller: non-POST calls must still be
//! acknowledged with 200 rather than 405.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

use msb_core::{controller::WebhookController, domain::InboundRequest};

/// Telegram updates are small; anything larger is not for us.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Must outlast the 90s operation wait and the compute client timeout.
/// Expiry answers 500 like any other unhandled failure.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match env::var("PORT") {
            Ok(p) => p
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {p}"))?,
            Err(_) => 8080,
        };
        Ok(Self { host, port })
    }
}

pub fn router(controller: Arc<WebhookController>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/", any(handle_webhook))
        .route("/webhook", any(handle_webhook))
        .with_state(controller)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::INTERNAL_SERVER_ERROR,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

pub async fn serve(
    settings: ServerSettings,
    controller: Arc<WebhookController>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", settings.host, settings.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Webhook listening on {}", listener.local_addr()?);

    axum::serve(listener, router(controller))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down.");
}

/// GET /health
async fn handle_health() -> &'static str {
    "ok"
}

/// Any method on / or /webhook. The body is the numeric status code.
async fn handle_webhook(
    State(controller): State<Arc<WebhookController>>,
    method: Method,
    body: Bytes,
) -> impl IntoResponse {
    let resp = controller
        .handle(InboundRequest::new(method.as_str(), body.to_vec()))
        .await;
    let code = resp.code();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use msb_core::ports::{Bot, BotProvider};
    use msb_core::testing::{
        message_update, test_config, FakeCompute, RecordingMessenger, StaticBotProvider,
    };
    use tower::ServiceExt;

    fn app(status: &str) -> (Router, Arc<StaticBotProvider>) {
        let provider = Arc::new(StaticBotProvider::new(
            test_config(),
            RecordingMessenger::default(),
            FakeCompute::new(status),
        ));
        let controller = Arc::new(WebhookController::new(provider.clone()));
        (router(controller), provider)
    }

    fn post(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    struct HangingProvider;

    #[async_trait::async_trait]
    impl BotProvider for HangingProvider {
        async fn init(&self) -> msb_core::Result<Bot> {
            std::future::pending().await
        }
    }

    #[test]
    fn request_timeout_outlasts_downstream_timeouts() {
        let layer = Duration::from_secs(REQUEST_TIMEOUT_SECS);
        assert!(layer > msb_core::config::OPERATION_TIMEOUT);
        assert!(layer > msb_gce::HTTP_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_answers_500() {
        let controller = Arc::new(WebhookController::new(Arc::new(HangingProvider)));
        let body = message_update(-1001, "@McBot start").to_string();
        let resp = router(controller).oneshot(post("/", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn get_is_acknowledged_without_reply() {
        let (app, provider) = app("RUNNING");
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(provider.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn status_command_via_webhook_path() {
        let (app, provider) = app("RUNNING");
        let body = message_update(-1001, "@McBot status").to_string();
        let resp = app.oneshot(post("/webhook", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(provider.messenger.texts(), vec!["The server is running."]);
    }

    #[tokio::test]
    async fn invalid_command_maps_to_400() {
        let (app, _) = app("RUNNING");
        let body = message_update(-1001, "@McBot restart").to_string();
        let resp = app.oneshot(post("/", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_the_controller() {
        let (app, provider) = app("RUNNING");
        let resp = app
            .oneshot(post("/", "x".repeat(MAX_BODY_SIZE + 1)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(provider.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app("RUNNING");
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
