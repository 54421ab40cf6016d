//! Unified error type for the Impostor server.

use impostor_identity::IdentityError;
use impostor_lobby::GameError;
use impostor_protocol::{ErrorKind, ProtocolError};

use crate::ws::TransportError;

/// Top-level error wrapping every layer's error.
///
/// The `#[from]` attributes let `?` lift layer errors into this one.
#[derive(Debug, thiserror::Error)]
pub enum ImpostorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Game(#[from] GameError),
}

impl ImpostorError {
    /// The error category reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Unavailable,
            Self::Protocol(_) => ErrorKind::BadRequest,
            Self::Identity(err) => identity_kind(err),
            Self::Game(err) => err.kind(),
        }
    }
}

pub(crate) fn identity_kind(err: &IdentityError) -> ErrorKind {
    match err {
        IdentityError::AuthFailed(_) | IdentityError::InvalidToken | IdentityError::Expired(_) => {
            ErrorKind::Unauthorized
        }
        IdentityError::NotFound(_) => ErrorKind::NotFound,
        IdentityError::AlreadyConnected(_) => ErrorKind::InvalidState,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impostor_protocol::{SessionId, UserId};

    #[test]
    fn test_from_protocol_error() {
        let err: ImpostorError = ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, ImpostorError::Protocol(_)));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_identity_error_maps_to_unauthorized() {
        let err: ImpostorError = IdentityError::AuthFailed("nope".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err: ImpostorError = IdentityError::AlreadyConnected(UserId::from("u")).into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_from_game_error_keeps_kind() {
        let err: ImpostorError = GameError::SessionFull(SessionId(3)).into();
        assert!(matches!(err, ImpostorError::Game(_)));
        assert_eq!(err.kind(), ErrorKind::SessionFull);
        assert_eq!(err.kind().code(), 409);
    }
}
