//! Error types for the lobby engine.
//!
//! One enum, [`GameError`], covers everything the engine can refuse. The
//! variants line up one-to-one with the protocol's [`ErrorKind`], which
//! carries an HTTP-style status code to the client:
//!
//! | variant | kind | code |
//! |---|---|---|
//! | `InvalidSettings` | `InvalidSettings` | 400 |
//! | `Forbidden` | `Forbidden` | 403 |
//! | `NotFound` | `NotFound` | 404 |
//! | `InvalidState`, `SessionFull`, `InsufficientPlayers`, `AlreadyAssigned`, `IllegalTransition` | same name | 409 |
//! | `CapacityExhausted`, `Unavailable` | same name | 503 |
//!
//! Errors are values, not panics: a rejected command leaves the session
//! exactly as it was and publishes nothing.

use std::fmt;

use impostor_protocol::{ErrorKind, GameStatus, PlayerId, SessionId};

/// What a [`GameError::NotFound`] was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Session(SessionId),
    /// The normalized code (trimmed, upper-cased).
    Code(String),
    Player(PlayerId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session {id}"),
            Self::Code(code) => write!(f, "join code {code:?}"),
            Self::Player(id) => write!(f, "player {id}"),
        }
    }
}

/// Errors returned by session, lobby, role, round and vote operations.
///
/// Every error is scoped to one session and one operation; none of them
/// leave the session in a partially-updated state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Bad code, session id, or player id.
    #[error("{0} not found")]
    NotFound(Missing),

    /// The operation is not allowed in the session's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The requester lacks the privilege (usually: is not the host).
    #[error("player {0} is not allowed to do that")]
    Forbidden(PlayerId),

    /// The lobby already holds `max_players`. Rejoining players keep their
    /// seat and never see this.
    #[error("session {0} is full")]
    SessionFull(SessionId),

    /// Starting needs at least one crew member besides the impostors.
    #[error("not enough players: have {have}, need {need}")]
    InsufficientPlayers { have: usize, need: usize },

    /// Roles are fixed once assigned.
    #[error("roles already assigned in session {0}")]
    AlreadyAssigned(SessionId),

    /// A status change the round state machine does not allow, for
    /// example `Lobby -> Voting`. Finished is terminal, so every transition
    /// out of it lands here.
    #[error("illegal transition from {0} to {1}")]
    IllegalTransition(GameStatus, GameStatus),

    /// No free join code after the bounded number of draws. Means the code
    /// space is too small for the number of live sessions.
    #[error("no free join code after {attempts} attempts")]
    CapacityExhausted { attempts: u32 },

    /// Rejected [`SessionSettings`](crate::SessionSettings); the message
    /// names the offending field.
    #[error("invalid session settings: {0}")]
    InvalidSettings(String),

    /// The session actor is gone (destroyed or shutting down).
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),
}

impl GameError {
    /// The wire category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::SessionFull(_) => ErrorKind::SessionFull,
            Self::InsufficientPlayers { .. } => ErrorKind::InsufficientPlayers,
            Self::AlreadyAssigned(_) => ErrorKind::AlreadyAssigned,
            Self::IllegalTransition(..) => ErrorKind::IllegalTransition,
            Self::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            Self::InvalidSettings(_) => ErrorKind::InvalidSettings,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub(crate) fn player_not_found(id: PlayerId) -> Self {
        Self::NotFound(Missing::Player(id))
    }

    pub(crate) fn wrong_status(action: &str, status: GameStatus) -> Self {
        Self::InvalidState(format!("cannot {action} while session is {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_names_the_missing_thing() {
        let err = GameError::NotFound(Missing::Code("ZZZZZZ".into()));
        assert_eq!(err.to_string(), "join code \"ZZZZZZ\" not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_illegal_transition_display() {
        let err = GameError::IllegalTransition(GameStatus::Lobby, GameStatus::Voting);
        assert_eq!(err.to_string(), "illegal transition from lobby to voting");
        assert_eq!(err.kind().code(), 409);
    }
}
