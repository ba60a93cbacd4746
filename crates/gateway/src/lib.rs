//! HTTP API gateway for LaBPrompT.
//!
//! Exposes the prompt-engineering routes under `/api` plus a `/health`
//! probe. Built on Axum.

pub mod api;
pub mod service;
pub mod sessions;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use labprompt_backend::{
    AdminService, BackendAllowance, BackendClient, BackendUsageStore, HttpDirectory,
};
use labprompt_config::{AppConfig, GatewayConfig};
use labprompt_quota::{AllowanceService, CharHeuristicEstimator, QuotaGuard, UsageStore};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::api::{ApiError, ApiState, SharedApiState};
use crate::service::PromptService;
use crate::sessions::SessionRegistry;

/// Build the full router.
///
/// Layers applied:
/// - Request body size limit
/// - In-memory rate limiting per client (health exempt)
/// - CORS restricted to the configured origins
/// - HTTP trace logging
pub fn build_router(state: SharedApiState, gateway: &GatewayConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api::api_router(state))
        .layer(DefaultBodyLimit::max(gateway.body_limit_bytes));

    if gateway.rate_limit_per_minute > 0 {
        let rate_limiter = Arc::new(RateLimiter::new(
            gateway.rate_limit_per_minute,
            std::time::Duration::from_secs(60),
        ));
        router = router.layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }));
    }

    router
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static(api::API_KEY_ID_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Assemble the API state from configuration.
///
/// With a hosted backend configured, usage and allowance go through it and
/// the admin routes are enabled; otherwise usage is kept in process.
pub fn build_state(config: &AppConfig) -> Result<SharedApiState, Box<dyn std::error::Error>> {
    let provider = labprompt_providers::build_from_config(config)?;

    let (service, admin) = match BackendClient::from_config(&config.backend) {
        Ok(client) => {
            let store: Arc<dyn UsageStore> = Arc::new(BackendUsageStore::new(
                client.clone(),
                &config.backend.usage_table,
            ));
            let allowance: Arc<dyn AllowanceService> =
                Arc::new(BackendAllowance::new(client.clone()));
            let quota = QuotaGuard::new(Arc::new(CharHeuristicEstimator), allowance, store)
                .with_enabled(config.quota.enabled);
            let service = PromptService::new(provider, &config.provider.model, quota)
                .with_settings(config);
            let admin = AdminService::new(
                Arc::new(HttpDirectory::new(client)),
                &config.backend.default_plan,
            );
            info!(backend = %config.backend.url.as_deref().unwrap_or_default(), "Hosted backend enabled");
            (service, Some(Arc::new(admin)))
        }
        Err(e) => {
            info!(reason = %e, "Running without hosted backend; admin routes disabled");
            (PromptService::from_config(config, provider), None)
        }
    };

    Ok(Arc::new(ApiState {
        service: Arc::new(service),
        sessions: SessionRegistry::new(config.gateway.max_sessions, config.gateway.max_history),
        admin,
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config)?;
    let app = build_router(state, &config.gateway);

    info!(
        addr = %addr,
        provider = %config.provider.name,
        model = %config.provider.model,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key.
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: std::time::Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: std::time::Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rate limiting middleware. The client key is the `X-Api-Key-Id` header,
/// then the `Authorization` header, then "anonymous". `/health` is exempt.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let client_key = req
        .headers()
        .get(api::API_KEY_ID_HEADER)
        .or_else(|| req.headers().get(axum::http::header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded, try again later",
        )
        .into_response();
    }

    next.run(req).await
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
