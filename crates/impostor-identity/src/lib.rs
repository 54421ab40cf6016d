//! Identity and presence for Impostor.
//!
//! This crate answers two questions for the server:
//!
//! 1. **Who is this?** The [`Authenticator`] trait turns an identity
//!    provider token into an [`Identity`]. The provider (Supabase,
//!    Firebase, ...) is injected, never a process-wide client, so tests
//!    can pass a [`StaticAuthenticator`].
//! 2. **Are they still here?** The [`PresenceTracker`] records live and
//!    dropped connections and lets a client resume with a secret token
//!    inside a grace period.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server shell (above)  ← authenticates handshakes, marks players inactive
//!     ↕
//! Identity layer (this crate)
//!     ↕
//! Protocol layer (below)  ← UserId, SessionId, PlayerId
//! ```

mod auth;
mod error;
mod presence;

pub use auth::{Authenticator, Identity, StaticAuthenticator, UserRole};
pub use error::IdentityError;
pub use presence::{Presence, PresenceConfig, PresenceState, PresenceTracker, Seat};
