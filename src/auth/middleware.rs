//! Authentication middleware
//!
//! Protects routes that require authentication.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::session::SESSION_COOKIE;
use crate::AppState;
use crate::data::User;
use crate::error::AppError;

/// Token from an `Authorization: Bearer` header (scheme is case-insensitive)
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

/// Candidate session tokens, bearer header first, then the session cookie
///
/// A proxy may add its own bearer token to a browser request, so the cookie
/// is still tried when the header does not name a session.
pub(crate) fn session_tokens(headers: &HeaderMap) -> Vec<String> {
    let cookie = CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned());

    let mut tokens: Vec<String> = bearer_token(headers).into_iter().collect();
    if let Some(cookie) = cookie.filter(|cookie| !tokens.contains(cookie)) {
        tokens.push(cookie);
    }
    tokens
}

async fn resolve_user(headers: &HeaderMap, state: &AppState) -> Result<Option<User>, AppError> {
    for token in session_tokens(headers) {
        if let Some(user) = state.sessions.resolve(&token).await? {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

/// Middleware to require authentication
///
/// Resolves the session from cookie or Authorization header and adds
/// [`CurrentUser`] to request extensions. Unauthenticated requests get
/// 401 and never reach the handler.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/api/books", post(create_book))
///     .route_layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_user(request.headers(), &state)
        .await?
        .ok_or(AppError::Unauthorized)?;

    tracing::debug!(user_id = %user.id, path = %request.uri().path(), "authenticated request");
    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

/// Extractor for current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>().cloned() {
            return Ok(current);
        }

        let state = AppState::from_ref(state);
        let user = resolve_user(&parts.headers, &state)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let current = CurrentUser(user);
        parts.extensions.insert(current.clone());

        Ok(current)
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    /// Storage errors still propagate; only "no session" maps to `None`.
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>().cloned() {
            return Ok(MaybeUser(Some(user)));
        }

        let state = AppState::from_ref(state);
        let user = resolve_user(&parts.headers, &state).await?;
        if let Some(user) = &user {
            parts.extensions.insert(CurrentUser(user.clone()));
        }

        Ok(MaybeUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_comes_before_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer from-header"));
        headers.insert("Cookie", HeaderValue::from_static("session=from-cookie"));

        assert_eq!(session_tokens(&headers), ["from-header", "from-cookie"]);
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        for value in ["bearer abc", "BEARER abc", "Bearer   abc"] {
            let mut headers = HeaderMap::new();
            headers.insert("Authorization", HeaderValue::from_static(value));
            assert_eq!(session_tokens(&headers), ["abc"], "{value}");
        }
    }

    #[test]
    fn session_cookie_is_read() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Cookie",
            HeaderValue::from_static("oauth_state=abc; session=from-cookie"),
        );

        assert_eq!(session_tokens(&headers), ["from-cookie"]);
    }

    #[test]
    fn same_token_in_both_places_is_listed_once() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer tok"));
        headers.insert("Cookie", HeaderValue::from_static("session=tok"));

        assert_eq!(session_tokens(&headers), ["tok"]);
    }

    #[test]
    fn other_schemes_yield_nothing() {
        for value in ["Basic abc", "Bearer", "Bearer   ", "Bearerabc"] {
            let mut headers = HeaderMap::new();
            headers.insert("Authorization", HeaderValue::from_static(value));
            assert!(session_tokens(&headers).is_empty(), "{value}");
        }
    }
}
