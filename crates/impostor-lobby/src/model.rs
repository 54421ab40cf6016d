//! Session and player records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use impostor_protocol::{
    Elimination, Faction, GameStatus, PlayerId, PlayerView, SessionId, SessionView, UserId,
};

use crate::{JoinCode, SessionSettings};

/// Who is joining: the part of an authenticated user the engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl PlayerProfile {
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// A user's seat in exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_impostor: bool,
    pub is_alive: bool,
    /// `false` while the player's connection is down.
    pub is_active: bool,
    pub score: u32,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    pub(crate) fn new(id: PlayerId, profile: PlayerProfile) -> Self {
        Self {
            id,
            user_id: profile.user_id,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            is_impostor: false,
            is_alive: true,
            is_active: true,
            score: 0,
            joined_at: Utc::now(),
        }
    }

    pub fn faction(&self) -> Faction {
        if self.is_impostor {
            Faction::Impostors
        } else {
            Faction::Crew
        }
    }
}

/// One entry in the ballot box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter: PlayerId,
    pub target: PlayerId,
}

/// The aggregate root: one game from lobby to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub code: JoinCode,
    pub host_id: PlayerId,
    pub status: GameStatus,
    /// Join order.
    pub players: Vec<Player>,
    pub max_players: usize,
    pub impostor_count: usize,
    /// 1-based; 0 while in the lobby.
    pub round: u32,
    /// Ballots of the current voting phase.
    pub votes: Vec<Ballot>,
    pub roles_assigned: bool,
    pub winner: Option<Faction>,
    pub last_elimination: Option<Elimination>,
    pub phase_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    next_player_id: u64,
}

impl GameSession {
    /// A fresh lobby with the host seated as the first player.
    pub fn new(
        id: SessionId,
        code: JoinCode,
        host: PlayerProfile,
        settings: &SessionSettings,
    ) -> Self {
        let host_id = PlayerId(1);
        Self {
            id,
            code,
            host_id,
            status: GameStatus::Lobby,
            players: vec![Player::new(host_id, host)],
            max_players: settings.max_players,
            impostor_count: settings.impostor_count,
            round: 0,
            votes: Vec::new(),
            roles_assigned: false,
            winner: None,
            last_elimination: None,
            phase_ends_at: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            next_player_id: 2,
        }
    }

    pub(crate) fn allocate_player_id(&mut self) -> PlayerId {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        id
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_by_user(&self, user_id: &UserId) -> Option<&Player> {
        self.players.iter().find(|p| &p.user_id == user_id)
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.host_id == id
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn alive_impostors(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.is_alive && p.is_impostor)
            .count()
    }

    pub fn alive_crew(&self) -> usize {
        self.players
            .iter()
            .filter(|p| p.is_alive && !p.is_impostor)
            .count()
    }

    pub fn impostors(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_impostor)
    }

    pub fn has_voted(&self, id: PlayerId) -> bool {
        self.votes.iter().any(|b| b.voter == id)
    }

    /// Builds the snapshot `viewer` is allowed to see.
    ///
    /// A viewer always sees their own role; impostors also see each other.
    /// Once the game is finished every role is revealed. `None` yields the
    /// public view with no roles.
    pub fn view_for(&self, viewer: Option<PlayerId>) -> SessionView {
        let finished = self.status == GameStatus::Finished;
        let viewer_is_impostor = viewer
            .and_then(|id| self.player(id))
            .is_some_and(|p| p.is_impostor);

        let players = self
            .players
            .iter()
            .map(|p| {
                let visible = finished
                    || viewer == Some(p.id)
                    || (viewer_is_impostor && p.is_impostor);
                PlayerView {
                    id: p.id,
                    user_id: p.user_id.clone(),
                    display_name: p.display_name.clone(),
                    avatar_url: p.avatar_url.clone(),
                    is_impostor: visible.then_some(p.is_impostor),
                    is_alive: p.is_alive,
                    is_active: p.is_active,
                    score: p.score,
                    has_voted: self.has_voted(p.id),
                }
            })
            .collect();

        SessionView {
            id: self.id,
            code: self.code.to_string(),
            host_id: self.host_id,
            status: self.status,
            round: self.round,
            players,
            max_players: self.max_players,
            impostor_count: self.impostor_count,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            phase_ends_at: self.phase_ends_at,
            winner: self.winner,
            last_elimination: self.last_elimination.clone(),
            you: viewer.filter(|id| self.player(*id).is_some()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::lobby;
    use super::*;

    fn with_roles(mut session: GameSession, impostors: &[u64]) -> GameSession {
        for p in &mut session.players {
            p.is_impostor = impostors.contains(&p.id.0);
        }
        session.roles_assigned = true;
        session.status = GameStatus::InProgress;
        session
    }

    #[test]
    fn test_new_session_seats_host_first() {
        let session = lobby(1, &SessionSettings::default());
        assert_eq!(session.players.len(), 1);
        assert_eq!(session.host_id, PlayerId(1));
        assert_eq!(session.status, GameStatus::Lobby);
        assert_eq!(session.round, 0);
        assert!(session.impostors().next().is_none());
    }

    #[test]
    fn test_view_for_crew_sees_only_own_role() {
        let session = with_roles(lobby(4, &SessionSettings::default()), &[3]);
        let view = session.view_for(Some(PlayerId(2)));

        assert_eq!(view.me().unwrap().is_impostor, Some(false));
        assert_eq!(view.player(PlayerId(3)).unwrap().is_impostor, None);
        assert_eq!(view.you, Some(PlayerId(2)));
    }

    #[test]
    fn test_view_for_impostor_sees_fellow_impostors() {
        let session = with_roles(lobby(5, &SessionSettings::new(5, 2)), &[2, 4]);
        let view = session.view_for(Some(PlayerId(2)));

        assert_eq!(view.player(PlayerId(4)).unwrap().is_impostor, Some(true));
        assert_eq!(view.player(PlayerId(1)).unwrap().is_impostor, None);
    }

    #[test]
    fn test_view_for_finished_reveals_everything() {
        let mut session = with_roles(lobby(3, &SessionSettings::default()), &[3]);
        session.status = GameStatus::Finished;
        let view = session.view_for(None);

        assert!(view.players.iter().all(|p| p.is_impostor.is_some()));
        assert_eq!(view.you, None);
    }

    #[test]
    fn test_view_for_unknown_viewer_has_no_you() {
        let session = lobby(2, &SessionSettings::default());
        let view = session.view_for(Some(PlayerId(99)));
        assert_eq!(view.you, None);
        assert!(view.players.iter().all(|p| p.is_impostor.is_none()));
    }

    #[test]
    fn test_session_serializes_with_wire_status() {
        let session = lobby(2, &SessionSettings::default());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "lobby");
        assert_eq!(json["code"], "TEST22");
        assert_eq!(json["players"].as_array().unwrap().len(), 2);
    }
}
