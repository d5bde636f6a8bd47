mod api;
mod auth;
mod config;
mod cors;
mod db;
mod error;
mod hub;
mod store;
mod ws;

use std::{sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{jwt::JwtAccessTokenService, service::ServiceTokenService};
use crate::config::HubConfig;
use crate::db::pool::{open_chat_database, PoolConfig};
use crate::error::{attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope};
use crate::hub::Hub;
use crate::store::{ChatStore, SeedData};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HubConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .init();

    if config.is_dev_jwt_secret() {
        warn!("CHATLINE_JWT_SECRET is unset; using the development secret");
    }
    config.validate_secrets()?;
    let jwt_service = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid hub JWT secret")?,
    );
    let service_tokens = match config.hook_secret.as_deref() {
        Some(secret) => Some(Arc::new(
            ServiceTokenService::new(secret).context("invalid CHATLINE_HOOK_SECRET")?,
        )),
        None => {
            warn!("CHATLINE_HOOK_SECRET is unset; collaborator hooks are disabled");
            None
        }
    };

    let hub = Hub::new(open_store(&config).await?);
    let app = build_router(hub, jwt_service, service_tokens, config.cors_origins.as_deref());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind hub listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting chat hub");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("hub server exited unexpectedly")
}

async fn open_store(config: &HubConfig) -> anyhow::Result<ChatStore> {
    match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = open_chat_database(database_url, PoolConfig::from_env()).await?;
            Ok(ChatStore::Postgres(pool))
        }
        None => {
            warn!("CHATLINE_DATABASE_URL is unset; chat history lives in memory only");
            match config.seed_path.as_deref() {
                Some(path) => {
                    let seed = SeedData::load(path)?;
                    info!(
                        path = %path.display(),
                        users = seed.users.len(),
                        channels = seed.channels.len(),
                        "seeded in-memory chat store"
                    );
                    Ok(ChatStore::memory_with_seed(seed))
                }
                None => Ok(ChatStore::memory()),
            }
        }
    }
}

fn build_router(
    hub: Hub,
    jwt_service: Arc<JwtAccessTokenService>,
    service_tokens: Option<Arc<ServiceTokenService>>,
    cors_origins: Option<&str>,
) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .with_state(hub.clone())
        .merge(ws::router(hub.clone(), jwt_service));
    if let Some(service_tokens) = service_tokens {
        router = router.merge(api::router(hub, service_tokens));
    }

    apply_middleware(router).layer(cors::cors_layer(cors_origins))
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz(State(hub): State<Hub>) -> (StatusCode, Json<Value>) {
    let sessions = hub.registry().session_count().await;
    (StatusCode::OK, Json(json!({ "status": "ok", "sessions": sessions })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(?error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(?error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::Value;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::{apply_middleware, build_router, MAX_REQUEST_BODY_BYTES};
    use crate::{
        auth::{jwt::JwtAccessTokenService, service::ServiceTokenService},
        hub::Hub,
        store::ChatStore,
    };

    fn jwt_service() -> Arc<JwtAccessTokenService> {
        Arc::new(
            JwtAccessTokenService::new("chatline_test_secret_that_is_definitely_long_enough")
                .expect("test jwt service should initialize"),
        )
    }

    fn test_router(hub: Hub) -> Router {
        let service_tokens = Arc::new(
            ServiceTokenService::new("chatline_hook_secret_that_is_definitely_long_enough")
                .expect("test service tokens should initialize"),
        );
        build_router(hub, jwt_service(), Some(service_tokens), None)
    }

    #[tokio::test]
    async fn health_check_reports_live_sessions_with_request_id() {
        let hub = Hub::new(ChatStore::memory());
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.connect(Uuid::new_v4(), tx).await;

        let response = test_router(hub)
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "req-healthz")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-request-id").expect("request id header"),
            "req-healthz"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        let parsed: Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["sessions"], 1);
    }

    #[tokio::test]
    async fn hook_errors_carry_the_request_id() {
        let response = test_router(Hub::new(ChatStore::memory()))
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/v1/hooks/channels/{}/deleted", Uuid::new_v4()))
                    .header("x-request-id", "req-hook")
                    .body(Body::empty())
                    .expect("hook request should build"),
            )
            .await
            .expect("hook request should return a response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        let parsed: Value = serde_json::from_slice(&body).expect("body should be json");
        assert_eq!(parsed["error"]["request_id"], "req-hook");
    }

    #[tokio::test]
    async fn hooks_are_not_mounted_without_a_hook_secret() {
        let app = build_router(Hub::new(ChatStore::memory()), jwt_service(), None, None);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/v1/hooks/channels/{}/deleted", Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("hook request should build"),
            )
            .await
            .expect("hook request should return a response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn panic_handler_returns_internal_server_error() {
        async fn panic_route() -> &'static str {
            panic!("test panic");
        }

        let app = apply_middleware(Router::new().route("/panic", get(panic_route)));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/panic")
                    .body(Body::empty())
                    .expect("panic request should build"),
            )
            .await
            .expect("panic request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn request_body_limit_is_enforced() {
        async fn echo(body: String) -> String {
            body
        }

        let oversized_body = "a".repeat(MAX_REQUEST_BODY_BYTES + 1);
        let app = apply_middleware(Router::new().route("/echo", post(echo)));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .header("content-type", "text/plain")
                    .body(Body::from(oversized_body))
                    .expect("echo request should build"),
            )
            .await
            .expect("echo request should return a response");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
