//! Authentication hook for validating user identity.
//!
//! Impostor does not verify credentials itself; the identity provider does.
//! The server hands the handshake token to an [`Authenticator`] and trusts
//! the [`Identity`] it returns.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use impostor_protocol::UserId;
use serde::{Deserialize, Serialize};

use crate::IdentityError;

/// Application role carried in the provider's user metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Player,
    Host,
    Admin,
}

/// An authenticated user, as reported by the identity provider.
///
/// The lobby engine only reads `user_id` and `display_name`; the rest is
/// carried along for logging and for callers that need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Builds an identity with a display name derived the same way the
    /// mobile client does it: explicit name, else the e-mail local part,
    /// else `"Player"`.
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        display_name: Option<&str>,
    ) -> Self {
        let email = email.into();
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .or_else(|| {
                email
                    .split('@')
                    .next()
                    .filter(|local| !local.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "Player".to_owned());

        Self {
            user_id: UserId(user_id.into()),
            email,
            display_name,
            avatar_url: None,
            role: UserRole::default(),
            created_at: Utc::now(),
        }
    }
}

/// Validates a client's token and returns who they are.
///
/// Implement this over the real provider's SDK or REST API. The server owns
/// one instance for its whole lifetime, hence `Send + Sync + 'static`.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the matching identity.
    ///
    /// # Errors
    /// Returns [`IdentityError::AuthFailed`] if the provider rejects it.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, IdentityError>> + Send;
}

/// In-memory authenticator backed by a fixed token table.
///
/// Stands in for the provider in tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as a valid credential for `identity`.
    pub fn with_user(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, IdentityError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::AuthFailed("unknown token".into()))
    }
}
