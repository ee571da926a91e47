//! OAuth callback state machine
//!
//! `Anonymous -> Redirected -> ProviderCallbackPending -> {Authenticated | Failed}`
//!
//! The redirect half lives in the route handlers. [`complete_login`] takes a
//! pending callback to its terminal state without touching HTTP types, so
//! every transition can be exercised with a mock provider.

use serde::Deserialize;

use super::provider::{IdentityProvider, ProviderError};
use crate::data::User;
use crate::error::AppError;
use crate::service::UserDirectory;

/// Query string of `/auth/{provider}/callback`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Terminal state of a provider callback
#[derive(Debug)]
pub enum LoginOutcome {
    /// The user exists locally; a session may be established
    Authenticated(User),
    /// The provider or the user refused, or the callback is not trustworthy
    Denied(String),
    /// Provider or storage failure
    Failed(AppError),
}

impl LoginOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LoginOutcome::Authenticated(_) => "authenticated",
            LoginOutcome::Denied(_) => "denied",
            LoginOutcome::Failed(_) => "failed",
        }
    }
}

/// Finish a login from the provider's callback parameters.
///
/// `expected_state` is the CSRF state saved in the `oauth_state` cookie
/// when the login started.
pub async fn complete_login(
    provider: &dyn IdentityProvider,
    directory: &UserDirectory,
    params: &CallbackParams,
    expected_state: Option<&str>,
) -> LoginOutcome {
    let kind = provider.kind();
    let outcome = run(provider, directory, params, expected_state).await;

    crate::metrics::LOGINS_TOTAL
        .with_label_values(&[kind.slug(), outcome.label()])
        .inc();

    match &outcome {
        LoginOutcome::Authenticated(user) => {
            tracing::info!(provider = %kind, user_id = %user.id, "login succeeded");
        }
        LoginOutcome::Denied(reason) => {
            tracing::warn!(provider = %kind, %reason, "login denied");
        }
        LoginOutcome::Failed(error) => {
            tracing::error!(provider = %kind, %error, "login failed");
        }
    }

    outcome
}

async fn run(
    provider: &dyn IdentityProvider,
    directory: &UserDirectory,
    params: &CallbackParams,
    expected_state: Option<&str>,
) -> LoginOutcome {
    if let Some(error) = &params.error {
        let reason = match &params.error_description {
            Some(description) => format!("provider returned {error}: {description}"),
            None => format!("provider returned {error}"),
        };
        return LoginOutcome::Denied(reason);
    }

    match (params.state.as_deref(), expected_state) {
        (Some(received), Some(expected)) if received == expected => {}
        (_, None) => return LoginOutcome::Denied("login state cookie missing".to_string()),
        _ => return LoginOutcome::Denied("state mismatch".to_string()),
    }

    let Some(code) = params.code.as_deref().filter(|code| !code.is_empty()) else {
        return LoginOutcome::Denied("authorization code missing".to_string());
    };

    let profile = match provider.exchange(code).await {
        Ok(profile) => profile,
        Err(ProviderError::ProfileIncomplete(field)) => {
            return LoginOutcome::Denied(format!("profile is missing {field}"));
        }
        Err(error) => return LoginOutcome::Failed(error.into()),
    };

    match directory.resolve(provider.kind(), &profile).await {
        Ok(user) => LoginOutcome::Authenticated(user),
        Err(error) => LoginOutcome::Failed(error),
    }
}
