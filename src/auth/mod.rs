//! OAuth authentication
//!
//! Handles:
//! - GitHub and Google OAuth flows
//! - Server-side sessions
//! - Authentication middleware

pub mod flow;
mod middleware;
mod provider;
pub(crate) mod routes;
pub mod session;

pub use flow::{CallbackParams, LoginOutcome, complete_login};
pub use middleware::{CurrentUser, MaybeUser, require_auth};
pub use provider::{
    IdentityProvider, OAuthProvider, ProviderAdapter, ProviderError, ProviderKind,
    ProviderProfile, ProviderRegistry, ProviderSettings,
};
pub use routes::{UserView, auth_router};
pub use session::SessionStore;
