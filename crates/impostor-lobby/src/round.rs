//! Game status transitions, win detection and scoring.
//!
//! ```text
//! Lobby ──start──→ InProgress ──call_vote / round timer──→ Voting
//!                      ↑                                    │
//!                      └──────── resolve, no winner ────────┤
//!                                                           └─ resolve, winner ─→ Finished
//! ```
//!
//! Any non-finished status may also move to `Finished` through
//! `force_end` (host abort) or `abandon` (everyone left).

use chrono::Utc;
use impostor_protocol::{Elimination, Faction, GameStatus, PlayerId};
use rand::Rng;

use crate::{GameError, GameSession, RoleAssigner, ScoringRules, VoteTally};

/// Owns the legal status graph.
pub struct RoundStateMachine;

impl RoundStateMachine {
    /// Returns `true` if `from → to` is an edge of the status graph.
    pub fn is_legal(from: GameStatus, to: GameStatus) -> bool {
        use GameStatus::*;
        matches!(
            (from, to),
            (Lobby, InProgress)
                | (InProgress, Voting)
                | (Voting, InProgress)
                | (Lobby | InProgress | Voting, Finished)
        )
    }

    /// # Errors
    /// Returns `IllegalTransition(from, to)` for anything off the graph.
    pub fn check(from: GameStatus, to: GameStatus) -> Result<(), GameError> {
        if Self::is_legal(from, to) {
            Ok(())
        } else {
            Err(GameError::IllegalTransition(from, to))
        }
    }

    /// Host starts the game: roles are assigned, round 1 begins.
    ///
    /// # Errors
    /// `Forbidden` for non-hosts, `IllegalTransition` outside the lobby,
    /// and whatever [`RoleAssigner::assign`] rejects.
    pub fn start<R: Rng + ?Sized>(
        session: &mut GameSession,
        requester: PlayerId,
        rng: &mut R,
    ) -> Result<(), GameError> {
        require_host(session, requester)?;
        Self::check(session.status, GameStatus::InProgress)?;
        RoleAssigner::assign(session, rng)?;

        session.status = GameStatus::InProgress;
        session.started_at = Some(Utc::now());
        session.round = 1;
        session.votes.clear();
        Ok(())
    }

    /// Host ends the discussion and opens the ballot box.
    ///
    /// # Errors
    /// `Forbidden` for non-hosts, `IllegalTransition` unless in progress.
    pub fn call_vote(session: &mut GameSession, requester: PlayerId) -> Result<(), GameError> {
        require_host(session, requester)?;
        Self::open_voting(session)
    }

    /// Opens the ballot box without a requester (round timer elapsed).
    ///
    /// # Errors
    /// `IllegalTransition` unless in progress.
    pub fn open_voting(session: &mut GameSession) -> Result<(), GameError> {
        Self::check(session.status, GameStatus::Voting)?;
        session.status = GameStatus::Voting;
        session.votes.clear();
        Ok(())
    }

    /// Tallies the ballot box and moves on.
    ///
    /// Correct voters score, then the win check runs: no impostor alive
    /// means crew wins, alive crew not outnumbering alive impostors means
    /// impostors win. Without a winner the next round starts.
    ///
    /// # Errors
    /// `InvalidState` unless voting.
    pub fn resolve_voting(
        session: &mut GameSession,
        scoring: &ScoringRules,
    ) -> Result<Elimination, GameError> {
        let mut result = VoteTally::resolve(session)?;

        if let (Some(eliminated), Some(true)) = (result.eliminated, result.was_impostor) {
            let voters: Vec<PlayerId> = session
                .votes
                .iter()
                .filter(|b| b.target == eliminated)
                .map(|b| b.voter)
                .collect();
            for player in session.players.iter_mut().filter(|p| voters.contains(&p.id)) {
                player.score += scoring.correct_vote_points;
            }
        }

        result.winner = Self::winner(session);
        match result.winner {
            Some(faction) => {
                Self::check(session.status, GameStatus::Finished)?;
                finish(session, Some(faction));
                for player in session.players.iter_mut().filter(|p| p.faction() == faction) {
                    player.score += scoring.win_points;
                }
            }
            None => {
                Self::check(session.status, GameStatus::InProgress)?;
                session.status = GameStatus::InProgress;
                session.round += 1;
            }
        }
        session.votes.clear();
        session.last_elimination = Some(result.clone());
        Ok(result)
    }

    /// The faction that has won given who is alive, if any.
    pub fn winner(session: &GameSession) -> Option<Faction> {
        let impostors = session.alive_impostors();
        if impostors == 0 {
            Some(Faction::Crew)
        } else if session.alive_crew() <= impostors {
            Some(Faction::Impostors)
        } else {
            None
        }
    }

    /// Host aborts the game. No winner, no further points.
    ///
    /// # Errors
    /// `Forbidden` for non-hosts, `IllegalTransition` if already finished.
    pub fn force_end(session: &mut GameSession, requester: PlayerId) -> Result<(), GameError> {
        require_host(session, requester)?;
        Self::abandon(session)
    }

    /// Ends the game with no winner (every player left, or host abort).
    ///
    /// # Errors
    /// `IllegalTransition` if already finished.
    pub fn abandon(session: &mut GameSession) -> Result<(), GameError> {
        Self::check(session.status, GameStatus::Finished)?;
        finish(session, None);
        Ok(())
    }
}

fn require_host(session: &GameSession, requester: PlayerId) -> Result<(), GameError> {
    if session.is_host(requester) {
        Ok(())
    } else {
        Err(GameError::Forbidden(requester))
    }
}

fn finish(session: &mut GameSession, winner: Option<Faction>) {
    session.status = GameStatus::Finished;
    session.finished_at = Some(Utc::now());
    session.winner = winner;
    session.phase_ends_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::lobby;
    use crate::{Ballot, SessionSettings};
    use rand::{SeedableRng, rngs::StdRng};

    /// Five players, `p5` is the only impostor, voting open.
    fn voting_session() -> GameSession {
        let mut session = lobby(5, &SessionSettings::new(5, 1));
        for p in &mut session.players {
            p.is_impostor = p.id == PlayerId(5);
        }
        session.roles_assigned = true;
        session.status = GameStatus::Voting;
        session.round = 1;
        session
    }

    fn vote(session: &mut GameSession, voter: u64, target: u64) {
        session.votes.push(Ballot {
            voter: PlayerId(voter),
            target: PlayerId(target),
        });
    }

    #[test]
    fn test_is_legal_covers_the_graph() {
        use GameStatus::*;
        assert!(RoundStateMachine::is_legal(Lobby, InProgress));
        assert!(RoundStateMachine::is_legal(InProgress, Voting));
        assert!(RoundStateMachine::is_legal(Voting, InProgress));
        assert!(RoundStateMachine::is_legal(Voting, Finished));
        assert!(RoundStateMachine::is_legal(Lobby, Finished));
        assert!(!RoundStateMachine::is_legal(Lobby, Voting));
        assert!(!RoundStateMachine::is_legal(Finished, Lobby));
        assert!(!RoundStateMachine::is_legal(Finished, Finished));
        assert!(!RoundStateMachine::is_legal(InProgress, Lobby));
    }

    #[test]
    fn test_start_by_host_assigns_roles_and_enters_round_one() {
        let mut session = lobby(5, &SessionSettings::new(5, 1));
        let mut rng = StdRng::seed_from_u64(11);

        RoundStateMachine::start(&mut session, PlayerId(1), &mut rng).unwrap();

        assert_eq!(session.status, GameStatus::InProgress);
        assert_eq!(session.round, 1);
        assert!(session.started_at.is_some());
        assert_eq!(session.impostors().count(), 1);
        assert_eq!(session.players.iter().filter(|p| !p.is_impostor).count(), 4);
    }

    #[test]
    fn test_start_by_non_host_returns_forbidden() {
        let mut session = lobby(3, &SessionSettings::new(5, 1));
        let mut rng = StdRng::seed_from_u64(12);
        let err = RoundStateMachine::start(&mut session, PlayerId(2), &mut rng).unwrap_err();
        assert_eq!(err, GameError::Forbidden(PlayerId(2)));
        assert_eq!(session.status, GameStatus::Lobby);
    }

    #[test]
    fn test_start_alone_returns_insufficient_players() {
        let mut session = lobby(1, &SessionSettings::new(5, 1));
        let mut rng = StdRng::seed_from_u64(13);
        let err = RoundStateMachine::start(&mut session, PlayerId(1), &mut rng).unwrap_err();
        assert!(matches!(err, GameError::InsufficientPlayers { have: 1, need: 2 }));
        assert_eq!(session.status, GameStatus::Lobby);
    }

    #[test]
    fn test_start_twice_returns_illegal_transition() {
        let mut session = lobby(3, &SessionSettings::new(5, 1));
        let mut rng = StdRng::seed_from_u64(14);
        RoundStateMachine::start(&mut session, PlayerId(1), &mut rng).unwrap();
        let err = RoundStateMachine::start(&mut session, PlayerId(1), &mut rng).unwrap_err();
        assert_eq!(
            err,
            GameError::IllegalTransition(GameStatus::InProgress, GameStatus::InProgress)
        );
    }

    #[test]
    fn test_call_vote_in_lobby_returns_illegal_transition() {
        let mut session = lobby(3, &SessionSettings::default());
        let err = RoundStateMachine::call_vote(&mut session, PlayerId(1)).unwrap_err();
        assert_eq!(
            err,
            GameError::IllegalTransition(GameStatus::Lobby, GameStatus::Voting)
        );
    }

    #[test]
    fn test_resolve_voting_impostor_out_crew_wins_and_scores() {
        let mut session = voting_session();
        vote(&mut session, 1, 5);
        vote(&mut session, 2, 5);
        vote(&mut session, 3, 5);
        vote(&mut session, 4, 1);
        vote(&mut session, 5, 1);

        let result = RoundStateMachine::resolve_voting(&mut session, &ScoringRules::default())
            .unwrap();

        assert_eq!(result.eliminated, Some(PlayerId(5)));
        assert_eq!(result.was_impostor, Some(true));
        assert_eq!(result.winner, Some(Faction::Crew));
        assert_eq!(session.status, GameStatus::Finished);
        assert_eq!(session.winner, Some(Faction::Crew));
        // correct vote (1) + win (3)
        assert_eq!(session.player(PlayerId(1)).unwrap().score, 4);
        // wrong vote, still on the winning side
        assert_eq!(session.player(PlayerId(4)).unwrap().score, 3);
        assert_eq!(session.player(PlayerId(5)).unwrap().score, 0);
        assert_eq!(session.last_elimination, Some(result));
    }

    #[test]
    fn test_resolve_voting_crew_out_next_round() {
        let mut session = voting_session();
        vote(&mut session, 1, 2);
        vote(&mut session, 3, 2);
        vote(&mut session, 5, 2);

        let result = RoundStateMachine::resolve_voting(&mut session, &ScoringRules::default())
            .unwrap();

        assert_eq!(result.eliminated, Some(PlayerId(2)));
        assert_eq!(result.was_impostor, Some(false));
        assert_eq!(result.winner, None);
        assert_eq!(session.status, GameStatus::InProgress);
        assert_eq!(session.round, 2);
        assert!(session.votes.is_empty());
        assert!(session.players.iter().all(|p| p.score == 0));
    }

    #[test]
    fn test_resolve_voting_crew_parity_impostors_win() {
        let mut session = lobby(3, &SessionSettings::new(3, 1));
        for p in &mut session.players {
            p.is_impostor = p.id == PlayerId(3);
        }
        session.status = GameStatus::Voting;
        session.round = 1;
        vote(&mut session, 2, 1);
        vote(&mut session, 3, 1);

        let result = RoundStateMachine::resolve_voting(&mut session, &ScoringRules::default())
            .unwrap();

        assert_eq!(result.winner, Some(Faction::Impostors));
        assert_eq!(session.status, GameStatus::Finished);
        assert_eq!(session.player(PlayerId(3)).unwrap().score, 3);
    }

    #[test]
    fn test_force_end_from_voting_has_no_winner() {
        let mut session = voting_session();
        RoundStateMachine::force_end(&mut session, PlayerId(1)).unwrap();
        assert_eq!(session.status, GameStatus::Finished);
        assert!(session.winner.is_none());
        assert!(session.players.iter().all(|p| p.score == 0));
    }

    #[test]
    fn test_force_end_finished_returns_illegal_transition() {
        let mut session = voting_session();
        RoundStateMachine::force_end(&mut session, PlayerId(1)).unwrap();
        let err = RoundStateMachine::force_end(&mut session, PlayerId(1)).unwrap_err();
        assert_eq!(
            err,
            GameError::IllegalTransition(GameStatus::Finished, GameStatus::Finished)
        );
    }

    #[test]
    fn test_force_end_by_non_host_returns_forbidden() {
        let mut session = voting_session();
        let err = RoundStateMachine::force_end(&mut session, PlayerId(3)).unwrap_err();
        assert_eq!(err, GameError::Forbidden(PlayerId(3)));
    }
}
