//! Per-viewer snapshots of a game session.
//!
//! The engine holds the full truth (including every player's role). What a
//! client receives is a [`SessionView`] built for *that* client: its own
//! role is visible, everyone else's is `None` until the game is finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Elimination, Faction, GameStatus, PlayerId, SessionId, UserId};

/// One player as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// `None` when the viewer is not allowed to know this player's role.
    pub is_impostor: Option<bool>,
    pub is_alive: bool,
    /// `false` while the player's connection is down.
    pub is_active: bool,
    pub score: u32,
    /// Whether a ballot from this player sits in the current voting phase.
    /// Who they voted for is never revealed.
    pub has_voted: bool,
}

/// A redacted, serializable snapshot of one game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub code: String,
    pub host_id: PlayerId,
    pub status: GameStatus,
    /// 1-based round counter; 0 while in the lobby.
    pub round: u32,
    /// Join order.
    pub players: Vec<PlayerView>,
    pub max_players: usize,
    pub impostor_count: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// When the running round or voting timer fires, if one is armed.
    pub phase_ends_at: Option<DateTime<Utc>>,
    pub winner: Option<Faction>,
    pub last_elimination: Option<Elimination>,
    /// The viewer's own player id, if they are seated in this session.
    pub you: Option<PlayerId>,
}

impl SessionView {
    /// Looks up a player by id.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    /// The viewer's own player record.
    pub fn me(&self) -> Option<&PlayerView> {
        self.you.and_then(|id| self.player(id))
    }

    /// Players still in the game.
    pub fn alive(&self) -> impl Iterator<Item = &PlayerView> {
        self.players.iter().filter(|p| p.is_alive)
    }
}
