//! Prometheus metrics registry, instruments and the `/metrics` endpoint.

use std::sync::Once;

use axum::{Router, http::header, response::IntoResponse, routing::get};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Auth Metrics
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookstore_logins_total", "OAuth callbacks by provider and outcome"),
        &["provider", "outcome"]
    ).expect("metric can be created");
    pub static ref USERS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookstore_users_created_total", "Users created on first login"),
        &["provider"]
    ).expect("metric can be created");
    pub static ref SESSIONS_PURGED_TOTAL: IntCounter = IntCounter::new(
        "bookstore_sessions_purged_total",
        "Expired sessions removed by the background sweep"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookstore_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Register all instruments with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(LOGINS_TOTAL.clone()))
            .expect("LOGINS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(USERS_CREATED_TOTAL.clone()))
            .expect("USERS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_PURGED_TOTAL.clone()))
            .expect("SESSIONS_PURGED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Prometheus text exposition of the registry
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Service",
    responses(
        (status = 200, description = "Metrics in Prometheus text format", body = String, content_type = "text/plain"),
        (status = 401, description = "No valid session", body = crate::api::MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn render() -> Result<impl IntoResponse, AppError> {
    let encoder = TextEncoder::new();
    let text = encoder
        .encode_to_string(&REGISTRY.gather())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode metrics: {e}")))?;

    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], text))
}

/// Router exposing `/metrics`; the auth gate is layered on by the caller.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(render))
}
