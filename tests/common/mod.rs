//! Common test utilities for E2E tests
//!
//! `TestServer` runs the real router on an ephemeral port. OAuth providers
//! are stood in for by a `wiremock` server whose token and profile
//! endpoints are mounted per login.

#![allow(dead_code)]

use bookstore::{AppState, config};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SESSION_SECRET: &str = "test-secret-key-that-is-32-bytes-long!";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    /// Does not follow redirects, so login redirects can be inspected
    pub client: reqwest::Client,
    pub provider: Option<MockServer>,
}

impl TestServer {
    /// Server with no OAuth provider configured
    pub async fn new() -> Self {
        Self::start(None).await
    }

    /// Server with GitHub and Google pointed at a mock provider
    pub async fn with_providers() -> Self {
        let provider = MockServer::start().await;

        // GitHub users without a public email get no extra addresses.
        Mock::given(method("GET"))
            .and(path("/github/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&provider)
            .await;

        Self::start(Some(provider)).await
    }

    async fn start(provider: Option<MockServer>) -> Self {
        bookstore::metrics::init_metrics();

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let provider_config = |kind: &str, userinfo: &str| match &provider {
            Some(mock) => config::OAuthProviderConfig {
                client_id: Some(format!("test-{kind}-client-id")),
                client_secret: Some(format!("test-{kind}-client-secret")),
                callback_url: Some(format!("http://localhost:4000/auth/{kind}/callback")),
                authorize_url: Some(format!("{}/{kind}/authorize", mock.uri())),
                token_url: Some(format!("{}/{kind}/token", mock.uri())),
                userinfo_url: Some(format!("{}/{kind}/{userinfo}", mock.uri())),
                emails_url: Some(format!("{}/{kind}/user/emails", mock.uri())),
            },
            None => config::OAuthProviderConfig::default(),
        };

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                session_secret: SESSION_SECRET.to_string(),
                session_max_age: 3600,
                session_sweep_interval_seconds: 3600,
                provider_timeout_seconds: 5,
                github: provider_config("github", "user"),
                google: provider_config("google", "userinfo"),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = bookstore::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
            provider,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    fn mock_provider(&self) -> &MockServer {
        self.provider
            .as_ref()
            .expect("server was started without providers")
    }

    /// Make `code` exchangeable for `profile` at the mock provider.
    pub async fn mount_profile(&self, kind: &str, code: &str, profile: Value) {
        let mock = self.mock_provider();
        let access_token = format!("tok-{code}");
        let userinfo = if kind == "github" { "user" } else { "userinfo" };

        Mock::given(method("POST"))
            .and(path(format!("/{kind}/token")))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "bearer"
            })))
            .mount(mock)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/{kind}/{userinfo}")))
            .and(header("authorization", format!("Bearer {access_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile))
            .mount(mock)
            .await;
    }

    /// Start a login; returns the redirect URL and the CSRF state cookie.
    pub async fn begin_login(&self, kind: &str) -> (url::Url, String) {
        let response = self
            .client
            .get(self.url(&format!("/auth/{kind}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 302);

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header");
        let location = url::Url::parse(location).unwrap();
        let state_cookie = cookie_value(&response, "oauth_state").expect("oauth_state cookie");

        (location, state_cookie)
    }

    /// Hit the callback the way a browser returning from the provider would.
    pub async fn callback(
        &self,
        kind: &str,
        query: &[(&str, &str)],
        state_cookie: Option<&str>,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .get(self.url(&format!("/auth/{kind}/callback")))
            .query(query);
        if let Some(state) = state_cookie {
            request = request.header(COOKIE, format!("oauth_state={state}"));
        }
        request.send().await.unwrap()
    }

    /// Full login round trip; returns the callback response.
    pub async fn login_response(&self, kind: &str, code: &str, profile: Value) -> reqwest::Response {
        self.mount_profile(kind, code, profile).await;
        let (location, state_cookie) = self.begin_login(kind).await;
        let state = query_param(&location, "state").expect("state in authorize URL");

        self.callback(kind, &[("code", code), ("state", state.as_str())], Some(&state_cookie))
            .await
    }

    /// Log in and return the session token.
    pub async fn login_as(&self, kind: &str, code: &str, profile: Value) -> String {
        let response = self.login_response(kind, code, profile).await;
        assert_eq!(response.status(), 200);
        cookie_value(&response, "session").expect("session cookie")
    }

    /// Log in as the default GitHub test user.
    pub async fn login(&self) -> String {
        self.login_as("github", "ada-code", ada_profile()).await
    }

    /// GET with the session cookie attached
    pub async fn get_with_session(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header(COOKIE, format!("session={token}"))
            .send()
            .await
            .unwrap()
    }
}

/// GitHub `/user` payload for the default test user
pub fn ada_profile() -> Value {
    json!({
        "id": 42,
        "login": "ada",
        "name": "Ada",
        "email": "ada@x.com",
        "avatar_url": null
    })
}

/// Value of the first non-empty `Set-Cookie` named `name`
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.trim().strip_prefix(prefix.as_str()))
        .find(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

/// Raw `Set-Cookie` header for `name`, attributes included
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with(prefix.as_str()))
        .map(ToOwned::to_owned)
}

pub fn query_param(url: &url::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
