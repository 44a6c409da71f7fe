//! Identity seam: who is signed in, and the bearer token that proves it.
//!
//! The conversion and credits APIs authenticate with an ID token. The host
//! decides where that token comes from (an OAuth flow, a CI secret, nothing
//! at all); the library only asks through [`IdentityProvider`].

use crate::error::SvgrError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

/// Source of the current user and their ID token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// Current ID token. `force_refresh` asks for a fresh one, used after the
    /// server rejected the previous token with 401.
    async fn id_token(&self, force_refresh: bool) -> Result<Option<String>, SvgrError>;
}

/// Nobody signed in; requests go out unauthenticated.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousIdentity;

#[async_trait]
impl IdentityProvider for AnonymousIdentity {
    fn current_user(&self) -> Option<AuthUser> {
        None
    }

    async fn id_token(&self, _force_refresh: bool) -> Result<Option<String>, SvgrError> {
        Ok(None)
    }
}

/// A fixed token supplied out of band (CLI flag or `SVGR_TOKEN`).
///
/// Refreshing is not possible, so a forced refresh returns the same token.
#[derive(Clone)]
pub struct StaticTokenIdentity {
    user: AuthUser,
    token: String,
}

impl std::fmt::Debug for StaticTokenIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenIdentity")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl StaticTokenIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            user: AuthUser {
                uid: "token".to_string(),
                email: None,
            },
            token: token.into(),
        }
    }

    pub fn with_user(mut self, user: AuthUser) -> Self {
        self.user = user;
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    fn current_user(&self) -> Option<AuthUser> {
        Some(self.user.clone())
    }

    async fn id_token(&self, _force_refresh: bool) -> Result<Option<String>, SvgrError> {
        if self.token.trim().is_empty() {
            return Err(SvgrError::IdentityFailed {
                reason: "empty token".into(),
            });
        }
        Ok(Some(self.token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anonymous_has_no_user_or_token() {
        let id = AnonymousIdentity;
        assert!(id.current_user().is_none());
        assert_eq!(id.id_token(true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn static_token_is_returned_on_refresh() {
        let id = StaticTokenIdentity::new("abc");
        assert_eq!(id.id_token(false).await.unwrap().as_deref(), Some("abc"));
        assert_eq!(id.id_token(true).await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn empty_static_token_is_an_error() {
        let id = StaticTokenIdentity::new("  ");
        assert!(matches!(
            id.id_token(false).await,
            Err(SvgrError::IdentityFailed { .. })
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let id = StaticTokenIdentity::new("secret-value");
        assert!(!format!("{id:?}").contains("secret-value"));
    }
}
