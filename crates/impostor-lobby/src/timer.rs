//! Round and voting deadlines.
//!
//! One `PhaseTimer` per session actor. It follows the session's phase: every
//! time the (status, round) pair changes the deadline is re-armed from the
//! configured duration, or cleared when that phase has no duration.

use std::time::Duration;

use chrono::Utc;
use impostor_protocol::GameStatus;
use tokio::time::{self, Instant};

use crate::GameSession;

/// Which phase a deadline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Phase {
    pub status: GameStatus,
    pub round: u32,
}

#[derive(Debug)]
pub(crate) struct PhaseTimer {
    round_duration: Option<Duration>,
    voting_duration: Option<Duration>,
    current: Option<Phase>,
    deadline: Option<Instant>,
}

impl PhaseTimer {
    pub(crate) fn new(round_duration: Option<Duration>, voting_duration: Option<Duration>) -> Self {
        Self {
            round_duration,
            voting_duration,
            current: None,
            deadline: None,
        }
    }

    /// Re-arms for the session's current phase if it changed, and mirrors
    /// the wall-clock deadline into `phase_ends_at`.
    pub(crate) fn sync(&mut self, session: &mut GameSession) {
        let phase = Phase {
            status: session.status,
            round: session.round,
        };
        if self.current == Some(phase) {
            return;
        }
        self.current = Some(phase);

        let duration = match phase.status {
            GameStatus::InProgress => self.round_duration,
            GameStatus::Voting => self.voting_duration,
            GameStatus::Lobby | GameStatus::Finished => None,
        };
        self.deadline = duration.map(|d| Instant::now() + d);
        session.phase_ends_at = duration
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the deadline passes and yields the phase it was armed
    /// for. Pends forever while disarmed, so it can sit in a `select!`.
    pub(crate) async fn expired(&self) -> Phase {
        match (self.deadline, self.current) {
            (Some(deadline), Some(phase)) => {
                time::sleep_until(deadline).await;
                phase
            }
            _ => std::future::pending().await,
        }
    }

    /// Clears the deadline after it fired; the next `sync` decides what
    /// comes next.
    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionSettings;
    use crate::model::fixtures::lobby;

    #[tokio::test(start_paused = true)]
    async fn test_sync_in_lobby_stays_disarmed() {
        let mut session = lobby(3, &SessionSettings::default());
        let mut timer = PhaseTimer::new(Some(Duration::from_secs(60)), None);
        timer.sync(&mut session);
        assert!(!timer.is_armed());
        assert!(session.phase_ends_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_fires_after_round_duration() {
        let mut session = lobby(3, &SessionSettings::default());
        session.status = GameStatus::InProgress;
        session.round = 1;
        let mut timer = PhaseTimer::new(Some(Duration::from_secs(60)), None);
        timer.sync(&mut session);
        assert!(session.phase_ends_at.is_some());

        let early = time::timeout(Duration::from_secs(59), timer.expired()).await;
        assert!(early.is_err());

        let phase = timer.expired().await;
        assert_eq!(phase.status, GameStatus::InProgress);
        assert_eq!(phase.round, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_same_phase_keeps_deadline() {
        let mut session = lobby(3, &SessionSettings::default());
        session.status = GameStatus::Voting;
        session.round = 1;
        let mut timer = PhaseTimer::new(None, Some(Duration::from_secs(10)));
        timer.sync(&mut session);
        let deadline = timer.deadline;

        time::advance(Duration::from_secs(3)).await;
        timer.sync(&mut session);

        assert_eq!(timer.deadline, deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_phase_pends_forever() {
        let mut session = lobby(3, &SessionSettings::default());
        session.status = GameStatus::Voting;
        session.round = 1;
        let mut timer = PhaseTimer::new(Some(Duration::from_secs(5)), None);
        timer.sync(&mut session);

        let result = time::timeout(Duration::from_secs(3600), timer.expired()).await;
        assert!(result.is_err());
        assert!(session.phase_ends_at.is_none());
    }
}
