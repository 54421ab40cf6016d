//! Core identity and game-state types shared by every Impostor crate.
//!
//! Everything here is plain data: it derives serde so it can travel on the
//! wire or be written to a document store keyed by session id.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one game session on this server.
///
/// Newtype over `u64` so a session id can never be passed where a player
/// id is expected. Serializes as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// Identifies a player *within* a session.
///
/// Distinct from [`UserId`]: the same user gets a fresh `PlayerId` every
/// time they join a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Stable, opaque user id issued by the identity provider.
///
/// The engine never interprets it; it only compares it to detect a user
/// joining the same session twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Borrows the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a game session.
///
/// ```text
/// Lobby ──start──→ InProgress ──call vote──→ Voting ──win──→ Finished
///                      ↑                       │
///                      └───────no winner───────┘
/// ```
///
/// Any non-finished status may also jump straight to `Finished` when the
/// host force-ends the game. The legality rules live in the lobby crate;
/// this type is only the wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Lobby,
    InProgress,
    Voting,
    Finished,
}

impl GameStatus {
    /// Returns `true` once the game can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns `true` while the session still owns its join code.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "lobby",
            Self::InProgress => "in_progress",
            Self::Voting => "voting",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// The two role factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Crew,
    Impostors,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crew => f.write_str("crew"),
            Self::Impostors => f.write_str("impostors"),
        }
    }
}

// ---------------------------------------------------------------------------
// Vote results
// ---------------------------------------------------------------------------

/// Number of ballots a single target received in one voting phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCount {
    pub target: PlayerId,
    pub votes: u32,
}

/// Outcome of resolving one voting phase.
///
/// `eliminated` is `None` on a tie or when nobody voted. The eliminated
/// player's role is revealed publicly through `was_impostor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    /// Round the vote belonged to (1-based).
    pub round: u32,
    pub eliminated: Option<PlayerId>,
    pub was_impostor: Option<bool>,
    /// Ballot counts, highest first; ties keep join order.
    pub tally: Vec<VoteCount>,
    /// Set when this elimination ended the game.
    pub winner: Option<Faction>,
}

impl Elimination {
    /// Returns `true` if the vote removed nobody.
    pub fn is_tie(&self) -> bool {
        self.eliminated.is_none()
    }
}
