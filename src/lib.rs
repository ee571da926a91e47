//! Bookstore - A small REST API for books and authors with OAuth login
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Books / authors CRUD (writes behind the auth gate)       │
//! │  - OAuth login routes (GitHub, Google)                      │
//! │  - OpenAPI docs, metrics                                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Auth + Service Layer                         │
//! │  - Identity providers, login flow                           │
//! │  - Session store, user directory                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for books, authors and API docs
//! - `auth`: OAuth providers, sessions and the auth gate
//! - `service`: User directory
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, middleware, routing::get};

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Server-side sessions
    pub sessions: auth::SessionStore,

    /// Provider identity to local user mapping
    pub directory: service::UserDirectory,

    /// Configured OAuth providers
    pub providers: Arc<auth::ProviderRegistry>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Build the OAuth provider registry
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        let providers = auth::ProviderRegistry::from_config(&config.auth)?;

        let enabled = providers.enabled();
        if enabled.is_empty() {
            tracing::warn!("No OAuth provider configured; write routes cannot be used");
        }

        tracing::info!(providers = ?enabled, "Application state initialized successfully");
        Ok(Self::from_parts(config, Arc::new(db), providers))
    }

    /// Assemble state from already-built parts
    pub fn from_parts(
        config: config::AppConfig,
        db: Arc<data::Database>,
        providers: auth::ProviderRegistry,
    ) -> Self {
        let sessions = auth::SessionStore::new(
            db.clone(),
            config.auth.session_secret.clone(),
            config.auth.session_max_age,
        );

        Self {
            config: Arc::new(config),
            directory: service::UserDirectory::new(db.clone()),
            db,
            sessions,
            providers: Arc::new(providers),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> Router {
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);
    let metrics_routes = metrics::metrics_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_auth,
    ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(auth::auth_router(&state.providers))
        .merge(api::api_router(state.clone()))
        .merge(metrics_routes)
        .fallback(not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Periodically delete expired sessions.
pub fn spawn_session_sweeper(
    sessions: auth::SessionStore,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));

        loop {
            interval.tick().await;

            match sessions.purge_expired().await {
                Ok(0) => tracing::debug!("No expired sessions"),
                Ok(purged) => tracing::info!(purged, "Expired sessions purged"),
                Err(error) => tracing::error!(%error, "Session sweep failed"),
            }
        }
    })
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

/// Liveness banner
#[utoipa::path(
    get,
    path = "/",
    tag = "Service",
    responses((status = 200, description = "Service is running", body = api::MessageResponse))
)]
async fn root() -> Json<api::MessageResponse> {
    Json(api::MessageResponse::new("Bookstore API is running"))
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "Service",
    responses((status = 200, description = "Always `OK`", body = String, content_type = "text/plain"))
)]
async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound("Route")
}
