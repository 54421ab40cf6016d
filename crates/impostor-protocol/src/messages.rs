//! Messages exchanged between the mobile client and the game server.
//!
//! Every frame on the wire is an [`Envelope`]. Its payload is either a
//! [`ClientMessage`] (client → server) or a [`ServerMessage`]
//! (server → client), adjacently tagged so a client can branch on
//! `payload.type` before looking at `payload.data.type`:
//!
//! ```text
//! { "seq": 4, "timestamp": 1200,
//!   "payload": { "type": "Client", "data": { "type": "CastVote", "target": 3 } } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{PlayerId, SessionId, SessionView, UserId};

/// The top-level wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number, incremented by the sender.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    pub payload: Payload,
}

/// Which side produced the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Client(ClientMessage),
    Server(ServerMessage),
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Requests a client can make.
///
/// Session operations (`CreateSession` through `ForceEnd`) are answered
/// with a fresh [`ServerMessage::SessionState`] or an
/// [`ServerMessage::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Must be the first message on a connection.
    ///
    /// `token` is the identity provider's session token. `resume_token`
    /// is the secret from a previous `HandshakeAck`; when it is still valid
    /// the server restores that identity without re-authenticating.
    Handshake {
        version: u32,
        token: Option<String>,
        #[serde(default)]
        resume_token: Option<String>,
    },

    /// Keep-alive. Echoed back with the server clock.
    Heartbeat { client_time: u64 },

    /// Host a new session. Omitted fields fall back to server defaults.
    CreateSession {
        #[serde(default)]
        max_players: Option<usize>,
        #[serde(default)]
        impostor_count: Option<usize>,
    },

    /// Join by the six-character code the host shared.
    JoinSession { code: String },

    LeaveSession,
    StartGame,

    /// Host moves the round into voting early.
    CallVote,

    CastVote { target: PlayerId },
    KickPlayer { target: PlayerId },
    ForceEnd,

    /// Client is going away on purpose.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Messages the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    HandshakeAck {
        user_id: UserId,
        display_name: String,
        /// Present it in a later `Handshake` to resume after a drop.
        resume_token: String,
        server_time: u64,
    },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Sent once after a successful create or join.
    SessionJoined {
        session_id: SessionId,
        player_id: PlayerId,
        code: String,
    },

    /// The client no longer belongs to this session (left or kicked).
    SessionLeft { session_id: SessionId },

    /// Snapshot of the session as this client is allowed to see it.
    SessionState { session: SessionView },

    Error {
        code: u16,
        kind: ErrorKind,
        message: String,
    },

    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable error category. UI layers translate these into
/// user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Forbidden,
    SessionFull,
    InsufficientPlayers,
    AlreadyAssigned,
    IllegalTransition,
    CapacityExhausted,
    InvalidSettings,
    Unavailable,
    BadRequest,
    Unauthorized,
}

impl ErrorKind {
    /// HTTP-style status code carried next to the kind.
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest | Self::InvalidSettings => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InvalidState
            | Self::SessionFull
            | Self::InsufficientPlayers
            | Self::AlreadyAssigned
            | Self::IllegalTransition => 409,
            Self::CapacityExhausted | Self::Unavailable => 503,
        }
    }

    /// Returns `true` if retrying the same request later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable | Self::CapacityExhausted)
    }
}
