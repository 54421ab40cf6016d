//! Ballots and plurality resolution.

use impostor_protocol::{Elimination, GameStatus, PlayerId, VoteCount};

use crate::{Ballot, GameError, GameSession};

/// The ballot box of the current voting phase.
pub struct VoteTally;

impl VoteTally {
    /// Records `voter`'s ballot. A later ballot replaces the earlier one.
    /// Self-votes are allowed.
    ///
    /// # Errors
    /// - `InvalidState` unless voting, or if voter or target is eliminated.
    /// - `NotFound` if voter or target is not in the session.
    pub fn cast_vote(
        session: &mut GameSession,
        voter: PlayerId,
        target: PlayerId,
    ) -> Result<(), GameError> {
        if session.status != GameStatus::Voting {
            return Err(GameError::wrong_status("vote", session.status));
        }
        let voter_alive = session
            .player(voter)
            .ok_or(GameError::player_not_found(voter))?
            .is_alive;
        if !voter_alive {
            return Err(GameError::InvalidState(format!(
                "player {voter} is eliminated and cannot vote"
            )));
        }
        let target_alive = session
            .player(target)
            .ok_or(GameError::player_not_found(target))?
            .is_alive;
        if !target_alive {
            return Err(GameError::InvalidState(format!(
                "player {target} is already eliminated"
            )));
        }

        match session.votes.iter_mut().find(|b| b.voter == voter) {
            Some(ballot) => ballot.target = target,
            None => session.votes.push(Ballot { voter, target }),
        }
        Ok(())
    }

    /// Returns `true` once every alive, connected player has a ballot in
    /// the box. Disconnected players are not waited for, but a ballot they
    /// cast before dropping still counts. With nobody connected the box is
    /// never complete.
    pub fn all_voted(session: &GameSession) -> bool {
        let mut voters = session
            .players
            .iter()
            .filter(|p| p.is_alive && p.is_active)
            .peekable();
        voters.peek().is_some() && voters.all(|p| session.has_voted(p.id))
    }

    /// Counts the ballots. The single player with strictly the most votes is
    /// eliminated; a tie at the top, or an empty box, eliminates nobody.
    ///
    /// Leaves the ballot box and status untouched and `winner` unset;
    /// [`RoundStateMachine::resolve_voting`](crate::RoundStateMachine::resolve_voting)
    /// handles those.
    ///
    /// # Errors
    /// Returns `InvalidState` unless voting.
    pub fn resolve(session: &mut GameSession) -> Result<Elimination, GameError> {
        if session.status != GameStatus::Voting {
            return Err(GameError::wrong_status("resolve votes", session.status));
        }

        let mut tally: Vec<VoteCount> = session
            .players
            .iter()
            .map(|p| VoteCount {
                target: p.id,
                votes: session.votes.iter().filter(|b| b.target == p.id).count() as u32,
            })
            .filter(|count| count.votes > 0)
            .collect();
        // stable: equal counts stay in join order
        tally.sort_by(|a, b| b.votes.cmp(&a.votes));

        let eliminated = match tally.as_slice() {
            [] => None,
            [first, second, ..] if first.votes == second.votes => None,
            [first, ..] => Some(first.target),
        };

        let was_impostor = eliminated.and_then(|id| {
            let player = session.player_mut(id)?;
            player.is_alive = false;
            Some(player.is_impostor)
        });

        match eliminated {
            Some(id) => tracing::info!(
                session_id = %session.id,
                round = session.round,
                player_id = %id,
                "player eliminated"
            ),
            None => tracing::info!(
                session_id = %session.id,
                round = session.round,
                "vote tied, nobody eliminated"
            ),
        }

        Ok(Elimination {
            round: session.round,
            eliminated,
            was_impostor,
            tally,
            winner: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionSettings;
    use crate::model::fixtures::lobby;

    fn voting(n: usize) -> GameSession {
        let mut session = lobby(n, &SessionSettings::new(n.max(2), 1));
        session.players[n - 1].is_impostor = true;
        session.roles_assigned = true;
        session.status = GameStatus::Voting;
        session.round = 1;
        session
    }

    fn cast(session: &mut GameSession, voter: u64, target: u64) {
        VoteTally::cast_vote(session, PlayerId(voter), PlayerId(target)).unwrap();
    }

    #[test]
    fn test_cast_vote_outside_voting_returns_invalid_state() {
        let mut session = voting(3);
        session.status = GameStatus::InProgress;
        let err = VoteTally::cast_vote(&mut session, PlayerId(1), PlayerId(2)).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
        assert!(session.votes.is_empty());
    }

    #[test]
    fn test_cast_vote_unknown_target_returns_not_found() {
        let mut session = voting(3);
        let err = VoteTally::cast_vote(&mut session, PlayerId(1), PlayerId(9)).unwrap_err();
        assert!(matches!(err, GameError::NotFound(_)));
    }

    #[test]
    fn test_cast_vote_by_eliminated_player_returns_invalid_state() {
        let mut session = voting(3);
        session.players[1].is_alive = false;
        let err = VoteTally::cast_vote(&mut session, PlayerId(2), PlayerId(1)).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn test_cast_vote_for_eliminated_target_returns_invalid_state() {
        let mut session = voting(3);
        session.players[1].is_alive = false;
        let err = VoteTally::cast_vote(&mut session, PlayerId(1), PlayerId(2)).unwrap_err();
        assert!(matches!(err, GameError::InvalidState(_)));
    }

    #[test]
    fn test_cast_vote_twice_overwrites() {
        let mut session = voting(3);
        cast(&mut session, 1, 2);
        cast(&mut session, 1, 3);
        assert_eq!(session.votes.len(), 1);
        assert_eq!(session.votes[0].target, PlayerId(3));
    }

    #[test]
    fn test_all_voted_ignores_eliminated_players() {
        let mut session = voting(3);
        session.players[2].is_alive = false;
        cast(&mut session, 1, 2);
        assert!(!VoteTally::all_voted(&session));
        cast(&mut session, 2, 1);
        assert!(VoteTally::all_voted(&session));
    }

    #[test]
    fn test_all_voted_skips_disconnected_players() {
        let mut session = voting(4);
        session.players[3].is_active = false;
        cast(&mut session, 1, 2);
        cast(&mut session, 2, 3);
        assert!(!VoteTally::all_voted(&session));
        cast(&mut session, 3, 2);
        assert!(VoteTally::all_voted(&session));
    }

    #[test]
    fn test_all_voted_nobody_connected_is_incomplete() {
        let mut session = voting(3);
        for player in &mut session.players {
            player.is_active = false;
        }
        assert!(!VoteTally::all_voted(&session));
    }

    #[test]
    fn test_resolve_tie_eliminates_nobody() {
        let mut session = voting(4);
        cast(&mut session, 1, 3);
        cast(&mut session, 2, 3);
        cast(&mut session, 3, 4);
        cast(&mut session, 4, 4);

        let result = VoteTally::resolve(&mut session).unwrap();

        assert!(result.is_tie());
        assert_eq!(result.was_impostor, None);
        assert_eq!(result.tally.len(), 2);
        assert!(session.players.iter().all(|p| p.is_alive));
    }

    #[test]
    fn test_resolve_plurality_eliminates_target() {
        let mut session = voting(4);
        cast(&mut session, 1, 2);
        cast(&mut session, 2, 3);
        cast(&mut session, 3, 2);
        cast(&mut session, 4, 2);

        let result = VoteTally::resolve(&mut session).unwrap();

        assert_eq!(result.eliminated, Some(PlayerId(2)));
        assert_eq!(result.was_impostor, Some(false));
        assert_eq!(
            result.tally,
            vec![
                VoteCount {
                    target: PlayerId(2),
                    votes: 3,
                },
                VoteCount {
                    target: PlayerId(3),
                    votes: 1,
                },
            ]
        );
        assert!(!session.player(PlayerId(2)).unwrap().is_alive);
    }

    #[test]
    fn test_resolve_empty_box_eliminates_nobody() {
        let mut session = voting(3);
        let result = VoteTally::resolve(&mut session).unwrap();
        assert!(result.is_tie());
        assert!(result.tally.is_empty());
    }

    #[test]
    fn test_resolve_outside_voting_returns_invalid_state() {
        let mut session = voting(3);
        session.status = GameStatus::Lobby;
        assert!(matches!(
            VoteTally::resolve(&mut session),
            Err(GameError::InvalidState(_))
        ));
    }
}
