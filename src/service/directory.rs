//! User directory
//!
//! Maps a provider identity onto a local user, creating it on first login.

use std::sync::Arc;

use crate::auth::{ProviderKind, ProviderProfile};
use crate::data::{Database, NewUser, User};
use crate::error::AppError;

/// User directory service
#[derive(Clone)]
pub struct UserDirectory {
    db: Arc<Database>,
}

impl UserDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Find the user for `(provider, profile.id)`, creating it if absent.
    ///
    /// An existing user is returned unchanged even when the provider now
    /// reports different attributes. Concurrent first logins for the same
    /// identity resolve to the same user.
    pub async fn resolve(
        &self,
        provider: ProviderKind,
        profile: &ProviderProfile,
    ) -> Result<User, AppError> {
        let new_user = NewUser {
            provider: provider.slug().to_string(),
            provider_id: profile.id.clone(),
            username: profile.username.clone(),
            display_name: profile
                .display_name
                .clone()
                .or_else(|| profile.username.clone()),
            email: profile.email.clone(),
            avatar_url: profile.avatar_url.clone(),
        };

        if self.db.insert_user_if_absent(&new_user).await? {
            crate::metrics::USERS_CREATED_TOTAL
                .with_label_values(&[provider.slug()])
                .inc();
            tracing::info!(provider = %provider, provider_id = %profile.id, "created user");
        }

        self.db
            .get_user_by_identity(provider.slug(), &profile.id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "user {}:{} vanished after insert",
                    provider.slug(),
                    profile.id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn directory() -> (UserDirectory, Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        (UserDirectory::new(db.clone()), db, temp_dir)
    }

    fn profile(id: &str, name: &str) -> ProviderProfile {
        ProviderProfile {
            id: id.to_string(),
            display_name: Some(name.to_string()),
            username: Some("ada".to_string()),
            email: Some("ada@x.com".to_string()),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn first_login_creates_user_from_profile() {
        let (directory, _db, _temp_dir) = directory().await;

        let user = directory
            .resolve(ProviderKind::Github, &profile("42", "Ada"))
            .await
            .unwrap();
        assert_eq!(user.provider, "github");
        assert_eq!(user.provider_id, "42");
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert_eq!(user.email.as_deref(), Some("ada@x.com"));
    }

    #[tokio::test]
    async fn repeat_login_keeps_existing_user() {
        let (directory, db, _temp_dir) = directory().await;

        let first = directory
            .resolve(ProviderKind::Github, &profile("42", "Ada"))
            .await
            .unwrap();
        let second = directory
            .resolve(ProviderKind::Github, &profile("42", "Countess of Lovelace"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(db.count_users(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn providers_do_not_share_users() {
        let (directory, db, _temp_dir) = directory().await;

        let github = directory
            .resolve(ProviderKind::Github, &profile("42", "Ada"))
            .await
            .unwrap();
        let google = directory
            .resolve(ProviderKind::Google, &profile("42", "Ada"))
            .await
            .unwrap();

        assert_ne!(github.id, google.id);
        assert_eq!(db.count_users(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn display_name_falls_back_to_username() {
        let (directory, _db, _temp_dir) = directory().await;

        let user = directory
            .resolve(
                ProviderKind::Github,
                &ProviderProfile {
                    id: "7".to_string(),
                    username: Some("octocat".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn concurrent_first_logins_create_one_user() {
        let (directory, db, _temp_dir) = directory().await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let directory = directory.clone();
                tokio::spawn(async move {
                    directory
                        .resolve(ProviderKind::Google, &profile("sub-1", "Ada"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(db.count_users(Some("google")).await.unwrap(), 1);
    }
}
