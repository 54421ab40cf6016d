//! Impostor selection.

use impostor_protocol::GameStatus;
use rand::Rng;

use crate::{GameError, GameSession, Player};

/// Picks the impostors when a game starts.
pub struct RoleAssigner;

impl RoleAssigner {
    /// Marks exactly `impostor_count` uniformly chosen players as impostors.
    ///
    /// Runs a partial Fisher–Yates shuffle over player indices and takes
    /// the first `impostor_count`. Roles are fixed afterwards.
    ///
    /// # Errors
    /// - `AlreadyAssigned` if roles were assigned before (checked first).
    /// - `InvalidState` outside the lobby.
    /// - `InsufficientPlayers` with fewer than `impostor_count + 1` players.
    pub fn assign<'a, R: Rng + ?Sized>(
        session: &'a mut GameSession,
        rng: &mut R,
    ) -> Result<&'a [Player], GameError> {
        if session.roles_assigned {
            return Err(GameError::AlreadyAssigned(session.id));
        }
        if session.status != GameStatus::Lobby {
            return Err(GameError::wrong_status("assign roles", session.status));
        }
        let need = session.impostor_count + 1;
        let have = session.players.len();
        if have < need {
            return Err(GameError::InsufficientPlayers { have, need });
        }

        let mut indices: Vec<usize> = (0..have).collect();
        for i in 0..session.impostor_count {
            let j = rng.random_range(i..have);
            indices.swap(i, j);
        }

        for player in &mut session.players {
            player.is_impostor = false;
        }
        for &index in &indices[..session.impostor_count] {
            session.players[index].is_impostor = true;
        }
        session.roles_assigned = true;

        tracing::debug!(
            session_id = %session.id,
            impostors = session.impostor_count,
            players = have,
            "roles assigned"
        );
        Ok(&session.players)
    }
}
