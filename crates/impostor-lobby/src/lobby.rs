//! Joining, leaving and kicking while a session is in the lobby.

use impostor_protocol::{GameStatus, PlayerId};

use crate::{GameError, GameSession, Player, PlayerProfile, RoundStateMachine};

/// Roster operations. Stateless; every call works on the session passed
/// in, which the session actor owns exclusively.
pub struct LobbyCoordinator;

impl LobbyCoordinator {
    /// Seats a user in the session and returns their player record.
    ///
    /// Joining twice is harmless: a user who already has a seat gets that
    /// seat back (marked active again) regardless of status or capacity.
    ///
    /// # Errors
    /// - `InvalidState` if the session has left the lobby.
    /// - `SessionFull` if every seat is taken.
    pub fn join(session: &mut GameSession, profile: PlayerProfile) -> Result<Player, GameError> {
        if let Some(existing) = session
            .players
            .iter_mut()
            .find(|p| p.user_id == profile.user_id)
        {
            existing.is_active = true;
            return Ok(existing.clone());
        }

        if session.status != GameStatus::Lobby {
            return Err(GameError::wrong_status("join", session.status));
        }
        if session.is_full() {
            return Err(GameError::SessionFull(session.id));
        }

        let id = session.allocate_player_id();
        let player = Player::new(id, profile);
        session.players.push(player.clone());
        Ok(player)
    }

    /// Removes a player from the lobby.
    ///
    /// If the host leaves, the earliest-joined remaining player becomes
    /// host. If nobody is left, the session is abandoned (finished, no
    /// winner) and its code freed.
    ///
    /// # Errors
    /// - `InvalidState` outside the lobby.
    /// - `NotFound` for an unknown player.
    pub fn leave(session: &mut GameSession, player_id: PlayerId) -> Result<(), GameError> {
        if session.status != GameStatus::Lobby {
            return Err(GameError::wrong_status("leave", session.status));
        }
        Self::remove(session, player_id)?;

        match session.players.first() {
            None => RoundStateMachine::abandon(session)?,
            Some(next) if session.host_id == player_id => {
                session.host_id = next.id;
                tracing::info!(
                    session_id = %session.id,
                    host_id = %next.id,
                    "host left, host migrated"
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Host-only removal of another player.
    ///
    /// # Errors
    /// - `Forbidden` unless `requester` is the host.
    /// - `InvalidState` outside the lobby or when the host targets themself.
    /// - `NotFound` for an unknown target.
    pub fn kick(
        session: &mut GameSession,
        requester: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        if !session.is_host(requester) {
            return Err(GameError::Forbidden(requester));
        }
        if session.status != GameStatus::Lobby {
            return Err(GameError::wrong_status("kick", session.status));
        }
        if target == requester {
            return Err(GameError::InvalidState("the host cannot kick themself".into()));
        }
        Self::remove(session, target)
    }

    /// Flags a player's connection as up or down. Works in every status and
    /// never removes anyone.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown player.
    pub fn set_active(
        session: &mut GameSession,
        player_id: PlayerId,
        active: bool,
    ) -> Result<(), GameError> {
        let player = session
            .player_mut(player_id)
            .ok_or(GameError::player_not_found(player_id))?;
        player.is_active = active;
        Ok(())
    }

    /// Hands the host role on after `departed` is gone for good, in any
    /// status. The earliest-joined active player takes over; with nobody
    /// active left the session is abandoned so its code and actor can be
    /// reclaimed.
    ///
    /// Returns the new host, or `None` if `departed` was not the host or
    /// the session was abandoned.
    ///
    /// # Errors
    /// `InvalidState` once the session has finished.
    pub fn migrate_host(
        session: &mut GameSession,
        departed: PlayerId,
    ) -> Result<Option<PlayerId>, GameError> {
        if session.status == GameStatus::Finished {
            return Err(GameError::wrong_status("migrate host", session.status));
        }
        if session.host_id != departed {
            return Ok(None);
        }

        let successor = session
            .players
            .iter()
            .find(|p| p.id != departed && p.is_active)
            .map(|p| p.id);
        match successor {
            Some(next) => {
                session.host_id = next;
                tracing::info!(
                    session_id = %session.id,
                    host_id = %next,
                    status = %session.status,
                    "host gone, host migrated"
                );
                Ok(Some(next))
            }
            None => {
                tracing::info!(session_id = %session.id, "host gone and nobody active, abandoning");
                RoundStateMachine::abandon(session)?;
                Ok(None)
            }
        }
    }

    fn remove(session: &mut GameSession, player_id: PlayerId) -> Result<(), GameError> {
        let index = session
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(GameError::player_not_found(player_id))?;
        session.players.remove(index);
        Ok(())
    }
}
