//! Wire protocol for Impostor.
//!
//! This crate defines what clients and the game server say to each other:
//!
//! - **Identity types** ([`SessionId`], [`PlayerId`], [`UserId`]) shared by
//!   every layer above.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]) wrapped in an
//!   [`Envelope`] for sequencing.
//! - **Views** ([`SessionView`], [`PlayerView`]): the per-viewer, redacted
//!   snapshot of a game session that gets pushed after every change.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) and [`ProtocolError`].
//!
//! The protocol layer knows nothing about connections or game rules. It
//! only describes shapes and how to turn them into bytes.
//!
//! ```text
//! WebSocket (bytes) → Protocol (Envelope) → Lobby engine (GameSession)
//! ```

mod codec;
mod error;
mod messages;
mod types;
mod view;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, Envelope, ErrorKind, Payload, ServerMessage};
pub use types::{
    Elimination, Faction, GameStatus, PlayerId, SessionId, UserId, VoteCount,
};
pub use view::{PlayerView, SessionView};
