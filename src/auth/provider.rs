//! OAuth identity providers
//!
//! Wraps the `oauth2` client for GitHub and Google. The authorize URL and
//! the authorization-code exchange go through `oauth2`; the profile is then
//! fetched from the provider's user endpoint and normalized into a
//! [`ProviderProfile`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AuthConfig, OAuthProviderConfig};
use crate::error::AppError;

const CLIENT_USER_AGENT: &str = concat!("bookstore/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Provider kinds
// =============================================================================

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Github, ProviderKind::Google];

    /// Lowercase name used in routes and stored on users
    pub fn slug(self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Google => "google",
        }
    }

    fn scopes(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Github => &["user:email"],
            ProviderKind::Google => &["openid", "profile", "email"],
        }
    }

    fn default_authorize_url(self) -> &'static str {
        match self {
            ProviderKind::Github => "https://github.com/login/oauth/authorize",
            ProviderKind::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    fn default_token_url(self) -> &'static str {
        match self {
            ProviderKind::Github => "https://github.com/login/oauth/access_token",
            ProviderKind::Google => "https://oauth2.googleapis.com/token",
        }
    }

    fn default_userinfo_url(self) -> &'static str {
        match self {
            ProviderKind::Github => "https://api.github.com/user",
            ProviderKind::Google => "https://openidconnect.googleapis.com/v1/userinfo",
        }
    }

    fn default_emails_url(self) -> Option<&'static str> {
        match self {
            ProviderKind::Github => Some("https://api.github.com/user/emails"),
            ProviderKind::Google => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Github => "GitHub",
            ProviderKind::Google => "Google",
        })
    }
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.slug().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| AppError::Validation(format!("unknown provider: {value}")))
    }
}

// =============================================================================
// Profile and errors
// =============================================================================

/// Normalized user attributes returned by a provider
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderProfile {
    /// Provider-issued identifier (always present)
    pub id: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The token endpoint rejected the code or answered with garbage
    #[error("code exchange failed: {0}")]
    Exchange(String),

    /// Network failure or non-success status from a provider endpoint
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered but a required field is missing
    #[error("provider profile is missing {0}")]
    ProfileIncomplete(&'static str),
}

/// One OAuth identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// URL the browser is redirected to, carrying `csrf_state`.
    fn authorize_url(&self, csrf_state: &str) -> String;

    /// Exchange an authorization code for the user's profile.
    async fn exchange(&self, code: &str) -> Result<ProviderProfile, ProviderError>;
}

// =============================================================================
// OAuth2 adapter
// =============================================================================

/// Fully resolved settings for one provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub emails_url: Option<String>,
}

impl ProviderSettings {
    /// Fill endpoint defaults for `kind`.
    ///
    /// # Errors
    /// Returns the names of missing credentials
    pub fn from_config(
        kind: ProviderKind,
        config: &OAuthProviderConfig,
    ) -> Result<Self, Vec<&'static str>> {
        let missing = config.missing_credentials();
        if !missing.is_empty() {
            return Err(missing);
        }

        let required = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        Ok(Self {
            kind,
            client_id: required(&config.client_id),
            client_secret: required(&config.client_secret),
            callback_url: required(&config.callback_url),
            authorize_url: config
                .authorize_url
                .clone()
                .unwrap_or_else(|| kind.default_authorize_url().to_string()),
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| kind.default_token_url().to_string()),
            userinfo_url: config
                .userinfo_url
                .clone()
                .unwrap_or_else(|| kind.default_userinfo_url().to_string()),
            emails_url: config
                .emails_url
                .clone()
                .or_else(|| kind.default_emails_url().map(str::to_string)),
        })
    }
}

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// [`IdentityProvider`] backed by a real OAuth2 authorization server
pub struct OAuthProvider {
    kind: ProviderKind,
    client: ConfiguredClient,
    http: reqwest::Client,
    userinfo_url: String,
    emails_url: Option<String>,
}

impl OAuthProvider {
    /// # Errors
    /// Returns `AppError::Config` if any configured URL is malformed
    pub fn new(settings: ProviderSettings, http: reqwest::Client) -> Result<Self, AppError> {
        let invalid = |field: &str, error: url::ParseError| {
            AppError::Config(format!(
                "auth.{}.{field} is not a valid URL: {error}",
                settings.kind.slug()
            ))
        };

        let client = BasicClient::new(ClientId::new(settings.client_id.clone()))
            .set_client_secret(ClientSecret::new(settings.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(settings.authorize_url.clone())
                    .map_err(|e| invalid("authorize_url", e))?,
            )
            .set_token_uri(
                TokenUrl::new(settings.token_url.clone()).map_err(|e| invalid("token_url", e))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(settings.callback_url.clone())
                    .map_err(|e| invalid("callback_url", e))?,
            );

        Ok(Self {
            kind: settings.kind,
            client,
            http,
            userinfo_url: settings.userinfo_url,
            emails_url: settings.emails_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, ProviderError> {
        let value = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;

        Ok(value)
    }

    async fn github_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let user: GitHubUser = self.get_json(&self.userinfo_url, access_token).await?;
        let id = user.id.ok_or(ProviderError::ProfileIncomplete("id"))?;

        let mut email = non_empty(user.email);
        if email.is_none() {
            if let Some(emails_url) = &self.emails_url {
                // Private addresses only show up on the emails endpoint.
                match self.get_json::<Vec<GitHubEmail>>(emails_url, access_token).await {
                    Ok(emails) => email = pick_github_email(emails),
                    Err(error) => {
                        tracing::warn!(%error, "failed to fetch GitHub email addresses");
                    }
                }
            }
        }

        Ok(ProviderProfile {
            id: id.to_string(),
            display_name: non_empty(user.name),
            username: non_empty(user.login),
            email,
            avatar_url: non_empty(user.avatar_url),
        })
    }

    async fn google_profile(&self, access_token: &str) -> Result<ProviderProfile, ProviderError> {
        let info: GoogleUserInfo = self.get_json(&self.userinfo_url, access_token).await?;
        let id = non_empty(info.sub).ok_or(ProviderError::ProfileIncomplete("sub"))?;

        Ok(ProviderProfile {
            id,
            display_name: non_empty(info.name),
            username: None,
            email: non_empty(info.email),
            avatar_url: non_empty(info.picture),
        })
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn authorize_url(&self, csrf_state: &str) -> String {
        let mut request = self
            .client
            .authorize_url(|| CsrfToken::new(csrf_state.to_string()));
        for scope in self.kind.scopes() {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, _) = request.url();
        url.to_string()
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, ProviderError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;
        let access_token = token.access_token().secret();

        match self.kind {
            ProviderKind::Github => self.github_profile(access_token).await,
            ProviderKind::Google => self.google_profile(access_token).await,
        }
    }
}

/// GET https://api.github.com/user
#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: Option<u64>,
    login: Option<String>,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

/// GET https://api.github.com/user/emails
#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// GET https://openidconnect.googleapis.com/v1/userinfo
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: Option<String>,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Primary verified address, else the first verified one.
fn pick_github_email(emails: Vec<GitHubEmail>) -> Option<String> {
    let mut verified = emails.into_iter().filter(|e| e.verified);
    let first = verified.next()?;
    if first.primary {
        return Some(first.email);
    }
    Some(
        verified
            .find(|e| e.primary)
            .map(|e| e.email)
            .unwrap_or(first.email),
    )
}

// =============================================================================
// Registry
// =============================================================================

/// A provider slot: usable, or switched off with the reason why.
#[derive(Clone)]
pub enum ProviderAdapter {
    Enabled(Arc<dyn IdentityProvider>),
    Disabled { reason: String },
}

/// The configured providers, built once at startup.
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, ProviderAdapter>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Registry with every provider disabled
    pub fn new() -> Self {
        let adapters = ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    ProviderAdapter::Disabled {
                        reason: "not configured".to_string(),
                    },
                )
            })
            .collect();
        Self { adapters }
    }

    /// Build adapters from configuration.
    ///
    /// A provider with missing credentials is disabled with a warning.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or a URL is malformed
    pub fn from_config(auth: &AuthConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .timeout(Duration::from_secs(auth.provider_timeout_seconds))
            // Token responses must never be followed to another host.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        let mut registry = Self::new();
        for kind in ProviderKind::ALL {
            match ProviderSettings::from_config(kind, auth.provider(kind)) {
                Ok(settings) => {
                    let provider = OAuthProvider::new(settings, http.clone())?;
                    registry = registry.with_provider(Arc::new(provider));
                    tracing::info!(provider = %kind, "OAuth provider enabled");
                }
                Err(missing) => {
                    let reason = format!("missing {}", missing.join(", "));
                    tracing::warn!(
                        provider = %kind,
                        %reason,
                        "OAuth credentials missing; skipping {} login routes",
                        kind
                    );
                    registry
                        .adapters
                        .insert(kind, ProviderAdapter::Disabled { reason });
                }
            }
        }

        Ok(registry)
    }

    /// Enable `provider` under its own kind, replacing any previous adapter.
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.adapters
            .insert(provider.kind(), ProviderAdapter::Enabled(provider));
        self
    }

    pub fn adapter(&self, kind: ProviderKind) -> Option<&ProviderAdapter> {
        self.adapters.get(&kind)
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn IdentityProvider>> {
        match self.adapters.get(&kind) {
            Some(ProviderAdapter::Enabled(provider)) => Some(Arc::clone(provider)),
            _ => None,
        }
    }

    /// Enabled providers in a stable order
    pub fn enabled(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_config(github: OAuthProviderConfig) -> AuthConfig {
        AuthConfig {
            session_secret: "x".repeat(32),
            session_max_age: 3600,
            session_sweep_interval_seconds: 3600,
            provider_timeout_seconds: 5,
            github,
            google: OAuthProviderConfig::default(),
        }
    }

    fn settings(kind: ProviderKind, base: &str) -> ProviderSettings {
        ProviderSettings {
            kind,
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            callback_url: format!("http://localhost:4000/auth/{}/callback", kind.slug()),
            authorize_url: format!("{base}/authorize"),
            token_url: format!("{base}/token"),
            userinfo_url: format!("{base}/user"),
            emails_url: Some(format!("{base}/user/emails")),
        }
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=good-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "gho_test",
                "token_type": "bearer",
                "scope": "user:email"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn provider_kind_parses_and_displays() {
        assert_eq!("github".parse::<ProviderKind>().unwrap(), ProviderKind::Github);
        assert_eq!("Google".parse::<ProviderKind>().unwrap(), ProviderKind::Google);
        assert!("gitlab".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Github.to_string(), "GitHub");
        assert_eq!(ProviderKind::Google.slug(), "google");
    }

    #[test]
    fn github_email_prefers_primary_verified() {
        let emails = vec![
            GitHubEmail {
                email: "unverified@x.com".to_string(),
                primary: true,
                verified: false,
            },
            GitHubEmail {
                email: "work@x.com".to_string(),
                primary: false,
                verified: true,
            },
            GitHubEmail {
                email: "ada@x.com".to_string(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(pick_github_email(emails).as_deref(), Some("ada@x.com"));
        assert_eq!(pick_github_email(Vec::new()), None);
    }

    #[test]
    fn registry_disables_providers_without_credentials() {
        let registry = ProviderRegistry::from_config(&auth_config(OAuthProviderConfig {
            client_id: Some("id".to_string()),
            ..Default::default()
        }))
        .unwrap();

        assert!(registry.enabled().is_empty());
        match registry.adapter(ProviderKind::Github) {
            Some(ProviderAdapter::Disabled { reason }) => {
                assert_eq!(reason, "missing client_secret, callback_url");
            }
            _ => panic!("github must be disabled"),
        }
    }

    #[test]
    fn registry_enables_configured_provider() {
        let registry = ProviderRegistry::from_config(&auth_config(OAuthProviderConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            callback_url: Some("http://localhost:4000/auth/github/callback".to_string()),
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(registry.enabled(), vec![ProviderKind::Github]);
        assert!(registry.get(ProviderKind::Google).is_none());
    }

    #[test]
    fn registry_rejects_malformed_urls() {
        let result = ProviderRegistry::from_config(&auth_config(OAuthProviderConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            callback_url: Some("not a url".to_string()),
            ..Default::default()
        }));
        assert!(matches!(result, Err(AppError::Config(message)) if message.contains("callback_url")));
    }

    #[test]
    fn authorize_url_carries_client_scope_and_state() {
        let provider = OAuthProvider::new(
            settings(ProviderKind::Github, "https://github.example"),
            reqwest::Client::new(),
        )
        .unwrap();

        let url = provider.authorize_url("csrf-123");
        assert!(url.starts_with("https://github.example/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("scope=user%3Aemail"));
        assert!(url.contains("state=csrf-123"));
        assert!(url.contains("response_type=code"));
    }

    #[tokio::test]
    async fn github_exchange_normalizes_profile_and_fetches_private_email() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer gho_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "login": "ada",
                "name": "Ada",
                "email": null,
                "avatar_url": "https://avatars.example/ada.png"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"email": "ada@x.com", "primary": true, "verified": true}
            ])))
            .mount(&server)
            .await;

        let provider = OAuthProvider::new(
            settings(ProviderKind::Github, &server.uri()),
            reqwest::Client::new(),
        )
        .unwrap();

        let profile = provider.exchange("good-code").await.unwrap();
        assert_eq!(
            profile,
            ProviderProfile {
                id: "42".to_string(),
                display_name: Some("Ada".to_string()),
                username: Some("ada".to_string()),
                email: Some("ada@x.com".to_string()),
                avatar_url: Some("https://avatars.example/ada.png".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn google_exchange_requires_subject() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Ada",
                "email": "ada@x.com"
            })))
            .mount(&server)
            .await;

        let provider = OAuthProvider::new(
            settings(ProviderKind::Google, &server.uri()),
            reqwest::Client::new(),
        )
        .unwrap();

        let error = provider.exchange("good-code").await.unwrap_err();
        assert!(matches!(error, ProviderError::ProfileIncomplete("sub")));
    }

    #[tokio::test]
    async fn rejected_code_is_an_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "The code passed is incorrect or expired."
            })))
            .mount(&server)
            .await;

        let provider = OAuthProvider::new(
            settings(ProviderKind::Github, &server.uri()),
            reqwest::Client::new(),
        )
        .unwrap();

        let error = provider.exchange("stale-code").await.unwrap_err();
        assert!(matches!(error, ProviderError::Exchange(_)));
    }

    #[tokio::test]
    async fn failing_profile_endpoint_is_a_transport_error() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider = OAuthProvider::new(
            settings(ProviderKind::Github, &server.uri()),
            reqwest::Client::new(),
        )
        .unwrap();

        let error = provider.exchange("good-code").await.unwrap_err();
        assert!(matches!(error, ProviderError::Transport(_)));
    }
}
