//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (BOOKSTORE__*, override)
//! 4. Plain provider/session variables (GITHUB_CLIENT_ID, SESSION_SECRET, ...)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

use crate::auth::ProviderKind;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 4000)
    pub port: u16,
    /// Public domain (e.g., "books.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL, like "https://books.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session cookie signing key (32+ bytes)
    pub session_secret: String,
    /// Session lifetime in seconds (default: 86400 = 1 day)
    pub session_max_age: i64,
    /// How often expired sessions are purged
    pub session_sweep_interval_seconds: u64,
    /// Upper bound for any single request to an OAuth provider
    pub provider_timeout_seconds: u64,
    #[serde(default)]
    pub github: OAuthProviderConfig,
    #[serde(default)]
    pub google: OAuthProviderConfig,
}

impl AuthConfig {
    pub fn provider(&self, kind: ProviderKind) -> &OAuthProviderConfig {
        match kind {
            ProviderKind::Github => &self.github,
            ProviderKind::Google => &self.google,
        }
    }
}

/// OAuth client settings for one provider.
///
/// Every field is optional so that a partially configured provider is
/// reported and disabled at startup instead of failing deserialization.
/// The endpoint overrides default to the provider's public endpoints.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OAuthProviderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub callback_url: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    /// GitHub only: endpoint listing the account's email addresses
    pub emails_url: Option<String>,
}

impl OAuthProviderConfig {
    /// Names of the required settings that are missing or blank.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .is_some_and(|value| !value.is_empty())
        };

        let mut missing = Vec::new();
        if !present(&self.client_id) {
            missing.push("client_id");
        }
        if !present(&self.client_secret) {
            missing.push("client_secret");
        }
        if !present(&self.callback_url) {
            missing.push("callback_url");
        }
        missing
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive such as `bookstore=debug,sqlx=warn`
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') || level.contains(',') {
            level.to_string()
        } else {
            format!("bookstore={level},tower_http={level}")
        }
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

/// Plain environment variables honoured on top of `BOOKSTORE__*`.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("SESSION_SECRET", "auth.session_secret"),
    ("GITHUB_CLIENT_ID", "auth.github.client_id"),
    ("GITHUB_CLIENT_SECRET", "auth.github.client_secret"),
    ("GITHUB_CALLBACK_URL", "auth.github.callback_url"),
    ("GOOGLE_CLIENT_ID", "auth.google.client_id"),
    ("GOOGLE_CLIENT_SECRET", "auth.google.client_secret"),
    ("GOOGLE_CALLBACK_URL", "auth.google.callback_url"),
];

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (BOOKSTORE__*)
    /// 5. Plain variables from [`ENV_OVERRIDES`]
    ///
    /// The result is not validated yet; call [`AppConfig::validate`] once
    /// logging is up so its warnings are visible.
    ///
    /// # Errors
    /// Returns error if a source cannot be read or deserialized
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/bookstore.db")?
            .set_default("auth.session_max_age", 86400)?
            .set_default("auth.session_sweep_interval_seconds", 3600)?
            .set_default("auth.provider_timeout_seconds", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("BOOKSTORE")
                    .separator("__")
                    .try_parsing(true),
            );

        for (variable, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(variable).ok())?;
        }

        builder
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    /// Reject settings the server must not start with.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.auth.provider_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "auth.provider_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
