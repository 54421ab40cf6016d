//! # Impostor
//!
//! Game server for Impostor, a social deduction party game played from
//! phones. Players gather in a lobby behind a six-character join code, the
//! server secretly picks the impostors, and rounds of discussion and
//! voting run until one faction wins.
//!
//! The server is authoritative: every rule is enforced by a per-session
//! actor in [`impostor_lobby`], and each client only ever receives a view
//! redacted for the player it belongs to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use impostor::prelude::*;
//!
//! # async fn run() -> Result<(), ImpostorError> {
//! let auth = StaticAuthenticator::new()
//!     .with_user("dev-token", Identity::new("u-dev", "dev@example.com", None));
//! let server = ImpostorServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(auth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
pub mod logging;
mod server;
mod ws;

pub use error::ImpostorError;
pub use server::{ImpostorServer, ImpostorServerBuilder, PROTOCOL_VERSION, ServerConfig};
pub use ws::{ConnectionId, TransportError, WsConnection, WsListener};

/// Everything needed to embed and configure the server.
pub mod prelude {
    pub use crate::{
        ImpostorError, ImpostorServer, ImpostorServerBuilder, PROTOCOL_VERSION, ServerConfig,
    };
    pub use impostor_identity::{
        Authenticator, Identity, IdentityError, PresenceConfig, StaticAuthenticator,
    };
    pub use impostor_lobby::{GameError, RegistryConfig, ScoringRules, SessionSettings};
    pub use impostor_protocol::{
        ClientMessage, Codec, Envelope, ErrorKind, Faction, GameStatus, JsonCodec, Payload,
        PlayerId, ServerMessage, SessionId, SessionView, UserId,
    };
}
