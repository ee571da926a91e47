//! Error types for the bookstore API
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` and is the only place where
//! errors become HTTP responses. Response bodies are always
//! `{"message": "..."}` and never carry internal details.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::auth::{ProviderError, ProviderKind};

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404), e.g. `NotFound("Book")`
    #[error("{0} not found")]
    NotFound(&'static str),

    /// No session user on `/auth/me` (401)
    #[error("Not authenticated")]
    NotAuthenticated,

    /// No session user on a gated route (401)
    #[error("Unauthorized. Please log in to access this resource.")]
    Unauthorized,

    /// The provider denied the login or returned no usable profile (401)
    #[error("{provider} authentication failed")]
    AuthenticationDenied {
        provider: ProviderKind,
        reason: String,
    },

    /// Failed login for which the provider is unknown (401)
    #[error("Authentication failed")]
    LoginFailed,

    /// Missing or mistyped request field (400)
    #[error("{0}")]
    Validation(String),

    /// Code exchange or profile fetch failed (500)
    #[error("Authentication provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::NotAuthenticated | AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AppError::AuthenticationDenied { .. } | AppError::LoginFailed => {
                (StatusCode::UNAUTHORIZED, "authentication_denied")
            }
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, "provider"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Provider(_) => "Authentication provider error".to_string(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::Config(_) | AppError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_type();

        match &self {
            AppError::AuthenticationDenied { provider, reason } => {
                tracing::warn!(%provider, %reason, "authentication denied");
            }
            _ if status.is_server_error() => {
                tracing::error!(error = %self, error_type, "request failed");
            }
            _ => {}
        }

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        let body = Json(serde_json::json!({
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}
