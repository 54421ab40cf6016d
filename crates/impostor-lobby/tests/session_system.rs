//! Integration tests driving sessions through the registry and actors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use impostor_lobby::{
    GameError, GameSession, PlayerProfile, RegistryConfig, SessionHandle, SessionRegistry,
    SessionSettings,
};
use impostor_protocol::{Faction, GameStatus, PlayerId};

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn profile(n: u64) -> PlayerProfile {
    PlayerProfile::new(format!("user-{n}"), format!("Player {n}"))
}

fn registry() -> SessionRegistry {
    SessionRegistry::new(RegistryConfig {
        rng_seed: Some(7),
        ..RegistryConfig::default()
    })
}

/// Creates a session hosted by user 1 and joins users 2..=n.
async fn lobby_with(
    registry: &mut SessionRegistry,
    n: u64,
    settings: SessionSettings,
) -> SessionHandle {
    let handle = registry.create(profile(1), settings).unwrap();
    for i in 2..=n {
        handle.join(profile(i)).await.unwrap();
    }
    handle
}

fn impostor(session: &GameSession) -> PlayerId {
    session.impostors().next().unwrap().id
}

fn crew(session: &GameSession) -> Vec<PlayerId> {
    session
        .players
        .iter()
        .filter(|p| !p.is_impostor)
        .map(|p| p.id)
        .collect()
}

// =========================================================================
// Lobby
// =========================================================================

#[tokio::test]
async fn test_create_then_four_joins_then_start_one_impostor_four_crew() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 5, SessionSettings::new(5, 1)).await;

    let session = handle.start(pid(1)).await.unwrap();

    assert_eq!(session.status, GameStatus::InProgress);
    assert_eq!(session.round, 1);
    assert_eq!(session.impostors().count(), 1);
    assert_eq!(crew(&session).len(), 4);
}

#[tokio::test]
async fn test_join_full_session_returns_session_full() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 3, SessionSettings::new(3, 1)).await;

    let err = handle.join(profile(4)).await.unwrap_err();

    assert_eq!(err, GameError::SessionFull(handle.session_id()));
    assert_eq!(handle.snapshot().players.len(), 3);
}

#[tokio::test]
async fn test_join_by_code_then_same_user_again_returns_same_player() {
    let mut registry = registry();
    let handle = registry.create(profile(1), SessionSettings::default()).unwrap();
    let found = registry.find_by_code(handle.code().as_str()).unwrap();

    let (first, _) = found.join(profile(2)).await.unwrap();
    let (second, session) = found.join(profile(2)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(session.players.len(), 2);
}

#[tokio::test]
async fn test_leave_during_game_returns_invalid_state_roster_unchanged() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 4, SessionSettings::new(4, 1)).await;
    let before = handle.start(pid(1)).await.unwrap();

    let err = handle.leave(pid(3)).await.unwrap_err();

    assert!(matches!(err, GameError::InvalidState(_)));
    assert_eq!(handle.snapshot().players, before.players);
}

#[tokio::test]
async fn test_last_player_leaving_frees_code() {
    let mut registry = registry();
    let handle = registry.create(profile(1), SessionSettings::default()).unwrap();

    let session = handle.leave(pid(1)).await.unwrap();

    assert_eq!(session.status, GameStatus::Finished);
    assert!(registry.find_by_code(handle.code().as_str()).is_err());
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn test_start_by_guest_returns_forbidden() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 3, SessionSettings::new(5, 1)).await;
    let err = handle.start(pid(2)).await.unwrap_err();
    assert_eq!(err, GameError::Forbidden(pid(2)));
    assert_eq!(handle.status(), GameStatus::Lobby);
}

// =========================================================================
// Rounds and votes
// =========================================================================

#[tokio::test]
async fn test_impostor_count_unchanged_across_rounds() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 6, SessionSettings::new(6, 2)).await;
    let started = handle.start(pid(1)).await.unwrap();
    let impostors: Vec<PlayerId> = started.impostors().map(|p| p.id).collect();
    assert_eq!(impostors.len(), 2);

    handle.call_vote(pid(1)).await.unwrap();
    let target = crew(&started)[0];
    let mut session = handle.snapshot();
    for p in &started.players {
        session = handle.cast_vote(p.id, target).await.unwrap();
    }
    assert_eq!(session.round, 2);
    assert!(!session.player(target).unwrap().is_alive);
    assert_eq!(session.impostors().map(|p| p.id).collect::<Vec<_>>(), impostors);

    let ended = handle.force_end(pid(1)).await.unwrap();
    assert_eq!(ended.impostors().map(|p| p.id).collect::<Vec<_>>(), impostors);
    assert_eq!(ended.winner, None);
}

#[tokio::test]
async fn test_tied_vote_eliminates_nobody_and_next_round_starts() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 4, SessionSettings::new(4, 1)).await;
    let session = handle.start(pid(1)).await.unwrap();
    let crew = crew(&session);
    let (a, b) = (crew[0], crew[1]);
    handle.call_vote(pid(1)).await.unwrap();

    let voters: Vec<PlayerId> = session.players.iter().map(|p| p.id).collect();
    handle.cast_vote(voters[0], a).await.unwrap();
    handle.cast_vote(voters[1], a).await.unwrap();
    handle.cast_vote(voters[2], b).await.unwrap();
    let after = handle.cast_vote(voters[3], b).await.unwrap();

    let result = after.last_elimination.clone().unwrap();
    assert!(result.is_tie());
    assert_eq!(result.round, 1);
    assert!(after.players.iter().all(|p| p.is_alive));
    assert_eq!(after.status, GameStatus::InProgress);
    assert_eq!(after.round, 2);
}

#[tokio::test]
async fn test_plurality_vote_eliminates_target() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 4, SessionSettings::new(4, 1)).await;
    let session = handle.start(pid(1)).await.unwrap();
    let crew = crew(&session);
    let (a, b) = (crew[0], crew[1]);
    handle.call_vote(pid(1)).await.unwrap();

    let voters: Vec<PlayerId> = session.players.iter().map(|p| p.id).collect();
    handle.cast_vote(voters[0], a).await.unwrap();
    handle.cast_vote(voters[1], a).await.unwrap();
    handle.cast_vote(voters[2], a).await.unwrap();
    let after = handle.cast_vote(voters[3], b).await.unwrap();

    let result = after.last_elimination.clone().unwrap();
    assert_eq!(result.eliminated, Some(a));
    assert_eq!(result.was_impostor, Some(false));
    assert!(!after.player(a).unwrap().is_alive);
    assert_eq!(after.status, GameStatus::InProgress);
}

#[tokio::test]
async fn test_all_impostors_eliminated_crew_wins() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 5, SessionSettings::new(5, 1)).await;
    let session = handle.start(pid(1)).await.unwrap();
    let target = impostor(&session);
    handle.call_vote(pid(1)).await.unwrap();

    let mut last = None;
    for p in &session.players {
        last = Some(handle.cast_vote(p.id, target).await.unwrap());
    }
    let after = last.unwrap();

    assert_eq!(after.status, GameStatus::Finished);
    assert_eq!(after.winner, Some(Faction::Crew));
    assert!(after.finished_at.is_some());
    assert_eq!(after.last_elimination.as_ref().unwrap().winner, Some(Faction::Crew));
    for p in after.players.iter().filter(|p| !p.is_impostor) {
        assert_eq!(p.score, 4, "correct vote plus win bonus");
    }
}

#[tokio::test]
async fn test_vote_after_finish_returns_invalid_state() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 3, SessionSettings::new(3, 1)).await;
    handle.start(pid(1)).await.unwrap();
    handle.force_end(pid(1)).await.unwrap();

    let err = handle.cast_vote(pid(1), pid(2)).await.unwrap_err();
    assert!(matches!(err, GameError::InvalidState(_)));
    let err = handle.force_end(pid(1)).await.unwrap_err();
    assert_eq!(
        err,
        GameError::IllegalTransition(GameStatus::Finished, GameStatus::Finished)
    );
}

#[tokio::test]
async fn test_ballot_box_does_not_wait_for_disconnected_player() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 4, SessionSettings::new(4, 1)).await;
    handle.start(pid(1)).await.unwrap();
    handle.set_active(pid(4), false).await.unwrap();
    handle.call_vote(pid(1)).await.unwrap();

    handle.cast_vote(pid(1), pid(2)).await.unwrap();
    handle.cast_vote(pid(2), pid(3)).await.unwrap();
    let after = handle.cast_vote(pid(3), pid(2)).await.unwrap();

    assert_ne!(after.status, GameStatus::Voting);
    let result = after.last_elimination.clone().unwrap();
    assert_eq!(result.round, 1);
    assert_eq!(result.eliminated, Some(pid(2)));
}

#[tokio::test]
async fn test_last_awaited_voter_dropping_resolves_vote() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 4, SessionSettings::new(4, 1)).await;
    handle.start(pid(1)).await.unwrap();
    handle.call_vote(pid(1)).await.unwrap();
    handle.cast_vote(pid(1), pid(3)).await.unwrap();
    handle.cast_vote(pid(2), pid(3)).await.unwrap();
    let waiting = handle.cast_vote(pid(3), pid(2)).await.unwrap();
    assert_eq!(waiting.status, GameStatus::Voting);

    let after = handle.set_active(pid(4), false).await.unwrap();

    assert_ne!(after.status, GameStatus::Voting);
    let result = after.last_elimination.clone().unwrap();
    assert_eq!(result.eliminated, Some(pid(3)));
    assert!(!after.player(pid(4)).unwrap().is_active);
}

#[tokio::test]
async fn test_host_gone_mid_game_migrate_host_hands_control_on() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 4, SessionSettings::new(4, 1)).await;
    handle.start(pid(1)).await.unwrap();
    handle.set_active(pid(1), false).await.unwrap();
    assert_eq!(
        handle.call_vote(pid(2)).await.unwrap_err(),
        GameError::Forbidden(pid(2))
    );

    let session = handle.migrate_host(pid(1)).await.unwrap();
    assert_eq!(session.host_id, pid(2));
    assert_eq!(session.status, GameStatus::InProgress);

    let session = handle.call_vote(pid(2)).await.unwrap();
    assert_eq!(session.status, GameStatus::Voting);
    let session = handle.force_end(pid(2)).await.unwrap();
    assert_eq!(session.status, GameStatus::Finished);
}

#[tokio::test]
async fn test_migrate_host_with_nobody_active_abandons_and_frees_code() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 3, SessionSettings::new(3, 1)).await;
    handle.start(pid(1)).await.unwrap();
    for id in 1..=3 {
        handle.set_active(pid(id), false).await.unwrap();
    }

    let session = handle.migrate_host(pid(1)).await.unwrap();

    assert_eq!(session.status, GameStatus::Finished);
    assert!(session.winner.is_none());
    assert!(registry.find_by_code(handle.code().as_str()).is_err());
    assert_eq!(registry.collect_finished(Duration::ZERO).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_resolve_exactly_once() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 8, SessionSettings::new(8, 1)).await;
    let session = handle.start(pid(1)).await.unwrap();
    let target = impostor(&session);
    handle.call_vote(pid(1)).await.unwrap();

    let tasks: Vec<_> = session
        .players
        .iter()
        .map(|p| {
            let handle = handle.clone();
            let voter = p.id;
            tokio::spawn(async move { handle.cast_vote(voter, target).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let after = handle.snapshot();
    let result = after.last_elimination.clone().unwrap();
    assert_eq!(after.status, GameStatus::Finished);
    assert_eq!(result.round, 1);
    assert_eq!(result.tally.len(), 1);
    assert_eq!(result.tally[0].votes, 8);
}

// =========================================================================
// Timers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_round_timer_opens_voting_then_voting_timer_resolves() {
    let mut registry = registry();
    let settings = SessionSettings {
        round_duration: Some(Duration::from_secs(30)),
        voting_duration: Some(Duration::from_secs(20)),
        ..SessionSettings::new(4, 1)
    };
    let handle = lobby_with(&mut registry, 4, settings).await;
    let started = handle.start(pid(1)).await.unwrap();
    assert!(started.phase_ends_at.is_some());

    let mut rx = handle.watch();
    rx.wait_for(|s| s.status == GameStatus::Voting).await.unwrap();

    let session = rx
        .wait_for(|s| s.status == GameStatus::InProgress && s.round == 2)
        .await
        .unwrap()
        .clone();
    let result = session.last_elimination.clone().unwrap();
    assert!(result.is_tie(), "nobody voted");
    assert!(session.phase_ends_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_no_timers_session_stays_in_progress() {
    let mut registry = registry();
    let handle = lobby_with(&mut registry, 3, SessionSettings::new(3, 1)).await;
    handle.start(pid(1)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;

    let session = handle.snapshot();
    assert_eq!(session.status, GameStatus::InProgress);
    assert!(session.phase_ends_at.is_none());
}

// =========================================================================
// Observation
// =========================================================================

#[tokio::test]
async fn test_subscribe_runs_callback_until_unsubscribed() {
    let mut registry = registry();
    let handle = registry.create(profile(1), SessionSettings::default()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let subscription = handle.subscribe(move |session| {
        assert_eq!(session.status, GameStatus::Lobby);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    handle.join(profile(2)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    assert_eq!(handle.subscriber_count(), 0);
    handle.join(profile(3)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_subscription_unsubscribes() {
    let mut registry = registry();
    let handle = registry.create(profile(1), SessionSettings::default()).unwrap();
    {
        let _subscription = handle.subscribe(|_| {});
        assert_eq!(handle.subscriber_count(), 1);
    }
    assert_eq!(handle.subscriber_count(), 0);
}

#[tokio::test]
async fn test_rejected_command_publishes_nothing() {
    let mut registry = registry();
    let handle = registry.create(profile(1), SessionSettings::default()).unwrap();
    let rx = handle.watch();

    assert!(matches!(
        handle.start(pid(1)).await,
        Err(GameError::InsufficientPlayers { have: 1, need: 2 })
    ));

    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_destroy_waits_for_queued_commands() {
    let mut registry = registry();
    let handle = registry.create(profile(1), SessionSettings::new(10, 1)).unwrap();
    let id = handle.session_id();

    let joins: Vec<_> = (2..=6)
        .map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.join(profile(i)).await })
        })
        .collect();
    tokio::task::yield_now().await;
    let mut rx = handle.watch();
    registry.destroy(id).await;

    let mut joined = 0;
    for join in joins {
        // queued before the shutdown: applied; queued after: unavailable
        match join.await.unwrap() {
            Ok(_) => joined += 1,
            Err(err) => assert_eq!(err, GameError::Unavailable(id)),
        }
    }

    assert!(handle.is_closed());
    assert_eq!(handle.snapshot().players.len(), 1 + joined);
    while rx.changed().await.is_ok() {}
}
