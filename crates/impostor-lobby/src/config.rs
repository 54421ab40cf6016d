//! Session and registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::GameError;

// ---------------------------------------------------------------------------
// ScoringRules
// ---------------------------------------------------------------------------

/// Points awarded during a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Awarded to every voter whose target was eliminated and turned out to
    /// be an impostor.
    pub correct_vote_points: u32,

    /// Awarded to every member of the winning faction (alive or not) when
    /// the game finishes naturally. Force-ended games award nothing.
    pub win_points: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            correct_vote_points: 1,
            win_points: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// Per-session settings chosen by the host at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Roster cap, host included.
    pub max_players: usize,

    /// Number of impostors assigned at start.
    pub impostor_count: usize,

    /// Discussion phase length. `None` means the host calls the vote.
    pub round_duration: Option<Duration>,

    /// Voting phase length. `None` means voting ends only once every alive
    /// player has voted.
    pub voting_duration: Option<Duration>,

    pub scoring: ScoringRules,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_players: 10,
            impostor_count: 1,
            round_duration: None,
            voting_duration: None,
            scoring: ScoringRules::default(),
        }
    }
}

impl SessionSettings {
    /// Shorthand for the two numbers clients actually pick.
    pub fn new(max_players: usize, impostor_count: usize) -> Self {
        Self {
            max_players,
            impostor_count,
            ..Self::default()
        }
    }

    /// Checks `max_players >= 2` and `1 <= impostor_count < max_players`.
    ///
    /// # Errors
    /// Returns `GameError::InvalidSettings` describing the first violation.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.max_players < 2 {
            return Err(GameError::InvalidSettings(format!(
                "max_players must be at least 2, got {}",
                self.max_players
            )));
        }
        if self.impostor_count < 1 {
            return Err(GameError::InvalidSettings(
                "impostor_count must be at least 1".into(),
            ));
        }
        if self.impostor_count >= self.max_players {
            return Err(GameError::InvalidSettings(format!(
                "impostor_count ({}) must be less than max_players ({})",
                self.impostor_count, self.max_players
            )));
        }
        if matches!(self.round_duration, Some(d) if d.is_zero())
            || matches!(self.voting_duration, Some(d) if d.is_zero())
        {
            return Err(GameError::InvalidSettings(
                "phase durations must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Settings for a [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Join code draws before `create` gives up with `CapacityExhausted`.
    pub max_code_attempts: u32,

    /// Capacity of each session actor's command channel. Zero is treated
    /// as one.
    pub command_buffer: usize,

    /// Seeds the registry's RNG (codes and role shuffles). `None` seeds
    /// from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_code_attempts: 32,
            command_buffer: 64,
            rng_seed: None,
        }
    }
}
