//! Session management
//!
//! Sessions live in the database; the client holds a signed token
//! `base64(id).base64(hmac_sha256(id))`. Only `sha256(id)` is stored, so a
//! leaked database does not leak usable cookies. Logging out deletes the
//! row, which invalidates every copy of the token.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::data::{Database, SessionRecord, User};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";
/// Cookie carrying the CSRF state of an in-flight login
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
/// Lifetime of the CSRF state cookie, in seconds
pub const OAUTH_STATE_MAX_AGE: i64 = 600;

/// Server-side session store
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    secret: String,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, secret: impl Into<String>, max_age_seconds: i64) -> Self {
        Self {
            db,
            secret: secret.into(),
            max_age: Duration::seconds(max_age_seconds),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Open a session for `user` and return the token to hand to the client.
    pub async fn establish(&self, user: &User) -> Result<String, AppError> {
        let id = generate_token();
        let now = Utc::now();

        self.db
            .insert_session(&SessionRecord {
                id_hash: hash_session_id(&id),
                user_id: user.id.clone(),
                created_at: now,
                expires_at: now + self.max_age,
            })
            .await?;

        tracing::debug!(user_id = %user.id, "session established");
        self.sign(&id)
    }

    /// Resolve a token to its user.
    ///
    /// # Returns
    /// `None` for tampered, unknown or expired tokens
    pub async fn resolve(&self, token: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.verify(token) else {
            return Ok(None);
        };

        self.db
            .get_session_user(&hash_session_id(id), Utc::now())
            .await
    }

    /// Invalidate the session behind `token`.
    ///
    /// # Returns
    /// `true` if a stored session was removed
    pub async fn destroy(&self, token: &str) -> Result<bool, AppError> {
        let Some(id) = self.verify(token) else {
            return Ok(false);
        };

        self.db.delete_session(&hash_session_id(id)).await
    }

    /// Remove every expired session.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let purged = self.db.delete_expired_sessions(Utc::now()).await?;
        crate::metrics::SESSIONS_PURGED_TOTAL.inc_by(purged);
        Ok(purged)
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session secret: {e}")))
    }

    fn sign(&self, id: &str) -> Result<String, AppError> {
        let mut mac = self.mac()?;
        mac.update(id.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{id}.{signature}"))
    }

    /// Check the signature and return the session id.
    fn verify<'a>(&self, token: &'a str) -> Option<&'a str> {
        let (id, signature) = token.split_once('.')?;
        if id.is_empty() {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(id)
    }
}

/// 32 random bytes, URL-safe base64
pub fn generate_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_session_id(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(id.as_bytes()))
}

// =============================================================================
// Cookies
// =============================================================================

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub fn session_cookie(token: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(SESSION_COOKIE, token, secure);
    cookie.set_max_age(time::Duration::seconds(max_age.num_seconds()));
    cookie
}

pub fn oauth_state_cookie(state: String, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(OAUTH_STATE_COOKIE, state, secure);
    cookie.set_max_age(time::Duration::seconds(OAUTH_STATE_MAX_AGE));
    cookie
}

/// Expired cookie that makes the browser drop `name`
pub fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = base_cookie(name, String::new(), secure);
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NewUser;
    use tempfile::TempDir;

    async fn store_with_user(max_age_seconds: i64) -> (SessionStore, User, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        db.insert_user_if_absent(&NewUser {
            provider: "github".to_string(),
            provider_id: "42".to_string(),
            username: Some("ada".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
        let user = db
            .get_user_by_identity("github", "42")
            .await
            .unwrap()
            .unwrap();

        let store = SessionStore::new(Arc::new(db), "s".repeat(32), max_age_seconds);
        (store, user, temp_dir)
    }

    #[tokio::test]
    async fn established_session_resolves_to_user() {
        let (store, user, _temp_dir) = store_with_user(3600).await;

        let token = store.establish(&user).await.unwrap();
        let resolved = store.resolve(&token).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn each_login_gets_a_distinct_token() {
        let (store, user, _temp_dir) = store_with_user(3600).await;

        let first = store.establish(&user).await.unwrap();
        let second = store.establish(&user).await.unwrap();
        assert_ne!(first, second);

        assert!(store.destroy(&first).await.unwrap());
        assert!(store.resolve(&first).await.unwrap().is_none());
        assert!(store.resolve(&second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tampered_tokens_are_rejected() {
        let (store, user, _temp_dir) = store_with_user(3600).await;
        let token = store.establish(&user).await.unwrap();
        let (id, signature) = token.split_once('.').unwrap();

        let forged = format!("{}.{signature}", generate_token());
        assert!(store.resolve(&forged).await.unwrap().is_none());
        assert!(store.resolve(id).await.unwrap().is_none());
        assert!(store.resolve("").await.unwrap().is_none());
        assert!(store.resolve("not.base64!").await.unwrap().is_none());

        let other = SessionStore::new(store.db.clone(), "t".repeat(32), 3600);
        assert!(other.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let (store, user, _temp_dir) = store_with_user(3600).await;
        let token = store.establish(&user).await.unwrap();

        assert!(store.destroy(&token).await.unwrap());
        assert!(!store.destroy(&token).await.unwrap());
        assert!(!store.destroy("garbage").await.unwrap());
    }

    #[tokio::test]
    async fn expired_sessions_do_not_resolve_and_are_purged() {
        let (store, user, _temp_dir) = store_with_user(-1).await;
        let token = store.establish(&user).await.unwrap();

        assert!(store.resolve(&token).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[test]
    fn stored_hash_is_not_the_id() {
        let id = generate_token();
        let hash = hash_session_id(&id);
        assert_ne!(hash, id);
        assert_eq!(hash, hash_session_id(&id));
    }

    #[test]
    fn cookies_are_http_only_and_lax() {
        let cookie = session_cookie("token".to_string(), Duration::seconds(60), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));

        let state = oauth_state_cookie("csrf".to_string(), false);
        assert_eq!(state.max_age(), Some(time::Duration::seconds(600)));
        assert_eq!(state.secure(), Some(false));

        let removal = removal_cookie(SESSION_COOKIE, false);
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(time::Duration::ZERO));
    }
}
