//! OAuth login routes
//!
//! Implements the authorization code flow for every enabled provider.

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::flow::{CallbackParams, LoginOutcome, complete_login};
use super::middleware::{MaybeUser, session_tokens};
use super::provider::{ProviderKind, ProviderRegistry};
use super::session::{
    OAUTH_STATE_COOKIE, SESSION_COOKIE, generate_token, oauth_state_cookie, removal_cookie,
    session_cookie,
};
use crate::AppState;
use crate::api::MessageResponse;
use crate::data::User;
use crate::error::AppError;

/// Create authentication router
///
/// Routes:
/// - GET /auth/{provider} - Redirect to the provider (enabled providers only)
/// - GET /auth/{provider}/callback - OAuth callback
/// - GET /auth/me - Current user
/// - GET /auth/logout - Logout
/// - GET /auth/failure - Failed login
pub fn auth_router(providers: &ProviderRegistry) -> Router<AppState> {
    let router = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", get(logout))
        .route("/auth/failure", get(failure));

    providers
        .enabled()
        .into_iter()
        .fold(router, |router, kind| router.merge(provider_router(kind)))
}

fn provider_router(kind: ProviderKind) -> Router<AppState> {
    Router::new()
        .route(&format!("/auth/{}", kind.slug()), get(start_login))
        .route(&format!("/auth/{}/callback", kind.slug()), get(callback))
        .layer(Extension(kind))
}

/// User as returned by the auth endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            provider_id: user.provider_id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct LoginResponse {
    #[schema(example = "Logged in with GitHub")]
    message: String,
    user: UserView,
}

// =============================================================================
// Login
// =============================================================================

/// Start an OAuth login
///
/// Stores a fresh CSRF state in a short-lived cookie and sends the browser
/// to the provider's consent page.
#[utoipa::path(
    get,
    path = "/auth/{provider}",
    tag = "Auth",
    params(
        ("provider" = String, Path, description = "Identity provider")
    ),
    responses(
        (status = 302, description = "Redirect to the provider's consent page"),
        (status = 404, description = "Provider not enabled", body = MessageResponse)
    )
)]
pub(crate) async fn start_login(
    State(state): State<AppState>,
    Extension(kind): Extension<ProviderKind>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let provider = state.providers.get(kind).ok_or(AppError::NotFound("Provider"))?;

    let csrf_state = generate_token();
    let location = provider.authorize_url(&csrf_state);
    let jar = jar.add(oauth_state_cookie(
        csrf_state,
        state.config.should_use_secure_cookies(),
    ));

    tracing::debug!(provider = %kind, "redirecting to provider");
    Ok((StatusCode::FOUND, jar, [(LOCATION, location)]))
}

/// OAuth callback
///
/// The state cookie is single-use and cleared whatever the outcome.
#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    tag = "Auth",
    params(
        ("provider" = String, Path, description = "Identity provider"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "CSRF state echoed by the provider"),
        ("error" = Option<String>, Query, description = "Set when the user declined")
    ),
    responses(
        (status = 200, description = "Logged in; the session cookie is set", body = LoginResponse),
        (status = 401, description = "Login denied", body = MessageResponse),
        (status = 500, description = "Provider or storage failure", body = MessageResponse)
    )
)]
pub(crate) async fn callback(
    State(state): State<AppState>,
    Extension(kind): Extension<ProviderKind>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    let secure = state.config.should_use_secure_cookies();
    let Some(provider) = state.providers.get(kind) else {
        return AppError::NotFound("Provider").into_response();
    };

    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_owned());
    let jar = jar.add(removal_cookie(OAUTH_STATE_COOKIE, secure));

    let outcome = complete_login(
        provider.as_ref(),
        &state.directory,
        &params,
        expected_state.as_deref(),
    )
    .await;

    let user = match outcome {
        LoginOutcome::Authenticated(user) => user,
        LoginOutcome::Denied(reason) => {
            return (jar, AppError::AuthenticationDenied { provider: kind, reason })
                .into_response();
        }
        LoginOutcome::Failed(error) => return (jar, error).into_response(),
    };

    let token = match state.sessions.establish(&user).await {
        Ok(token) => token,
        Err(error) => return (jar, error).into_response(),
    };
    let jar = jar.add(session_cookie(token, state.sessions.max_age(), secure));

    let body = LoginResponse {
        message: format!("Logged in with {kind}"),
        user: UserView::from(&user),
    };
    (jar, Json(body)).into_response()
}

// =============================================================================
// Session
// =============================================================================

/// Current user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "The logged-in user", body = UserView),
        (status = 401, description = "Not authenticated", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn me(MaybeUser(user): MaybeUser) -> Result<Json<UserView>, AppError> {
    let user = user.ok_or(AppError::NotAuthenticated)?;
    Ok(Json(UserView::from(&user)))
}

/// Log out
///
/// Deletes the server-side sessions named by the request (if any) and clears
/// the cookie. The user record is kept.
#[utoipa::path(
    get,
    path = "/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    )
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    for token in session_tokens(&headers) {
        if state.sessions.destroy(&token).await? {
            tracing::debug!("session destroyed");
        }
    }

    let jar = jar.add(removal_cookie(
        SESSION_COOKIE,
        state.config.should_use_secure_cookies(),
    ));
    Ok((jar, Json(MessageResponse::new("Logged out"))))
}

#[derive(Debug, Deserialize)]
struct FailureParams {
    provider: Option<String>,
}

/// Failed login
///
/// Names the provider from the query, or the only enabled one.
#[utoipa::path(
    get,
    path = "/auth/failure",
    tag = "Auth",
    params(
        ("provider" = Option<String>, Query, description = "Provider that failed")
    ),
    responses(
        (status = 401, description = "Authentication failed", body = MessageResponse)
    )
)]
pub(crate) async fn failure(
    State(state): State<AppState>,
    Query(params): Query<FailureParams>,
) -> AppError {
    let named = params
        .provider
        .as_deref()
        .and_then(|value| value.parse::<ProviderKind>().ok());
    let enabled = state.providers.enabled();
    let kind = named.or(match enabled.as_slice() {
        [only] => Some(*only),
        _ => None,
    });

    match kind {
        Some(provider) => AppError::AuthenticationDenied {
            provider,
            reason: "login failure page".to_string(),
        },
        None => AppError::LoginFailed,
    }
}
