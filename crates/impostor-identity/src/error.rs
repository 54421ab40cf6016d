//! Error types for the identity layer.

use impostor_protocol::UserId;

/// Errors raised while authenticating a user or tracking their presence.
///
/// The server maps these onto protocol error kinds before they reach a
/// client:
///
/// - `AuthFailed`, `InvalidToken` and `Expired` become `Unauthorized`
///   (401). The client should fall back to a fresh login.
/// - `AlreadyConnected` becomes `InvalidState` (409): the same account is
///   live on another connection.
/// - `NotFound` becomes `NotFound` (404). It only shows up on internal
///   bookkeeping paths.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The identity provider rejected the token (invalid, expired, revoked).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No presence record exists for this user.
    #[error("no presence record for user {0}")]
    NotFound(UserId),

    /// The resume token does not belong to any known presence record.
    #[error("invalid resume token")]
    InvalidToken,

    /// The user stayed disconnected past the grace period.
    #[error("presence expired for user {0}")]
    Expired(UserId),

    /// The user already has a live connection.
    #[error("user {0} is already connected")]
    AlreadyConnected(UserId),
}
