//! Session actor: an isolated Tokio task that owns one `GameSession`.
//!
//! Mutations arrive through a bounded mpsc channel and are applied one at a
//! time, so concurrent votes are linearized before any resolve. After every
//! successful mutation the actor publishes an `Arc<GameSession>` snapshot on
//! a watch channel and runs the registered subscriber callbacks. Readers
//! never wait on the writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use impostor_protocol::{GameStatus, PlayerId, SessionId};
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot, watch};

use crate::timer::{Phase, PhaseTimer};
use crate::{
    GameError, GameSession, JoinCode, LobbyCoordinator, Player, PlayerProfile, RoundStateMachine,
    ScoringRules, SessionSettings, VoteTally,
};

type Reply<T> = oneshot::Sender<Result<T, GameError>>;

/// Commands sent to a session actor. Every variant carries a reply channel.
pub(crate) enum SessionCommand {
    Join {
        profile: PlayerProfile,
        reply: Reply<(Player, Arc<GameSession>)>,
    },
    Leave {
        player_id: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    Kick {
        requester: PlayerId,
        target: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    SetActive {
        player_id: PlayerId,
        active: bool,
        reply: Reply<Arc<GameSession>>,
    },
    MigrateHost {
        departed: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    Start {
        requester: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    CallVote {
        requester: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    CastVote {
        voter: PlayerId,
        target: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    ForceEnd {
        requester: PlayerId,
        reply: Reply<Arc<GameSession>>,
    },
    /// Queued behind everything already sent; acknowledged once the actor
    /// has stopped.
    Shutdown { reply: oneshot::Sender<()> },
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Callback run on the actor task after every change. Keep it short; a slow
/// callback delays the session's next command.
pub type SessionCallback = dyn Fn(&GameSession) + Send + Sync;

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Arc<SessionCallback>)>>,
}

impl Subscribers {
    fn add(&self, callback: Arc<SessionCallback>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, callback));
        id
    }

    fn remove(&self, id: u64) -> bool {
        let mut callbacks = self.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn notify(&self, session: &GameSession) {
        // Copied out so a callback may unsubscribe without deadlocking.
        let callbacks: Vec<Arc<SessionCallback>> =
            self.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(session);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<SessionCallback>)>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Removes the callback. Same as dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle to a running session actor.
///
/// Cheap to clone: a channel sender, a watch receiver and an `Arc`. The
/// registry holds one per session and hands out clones.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    code: JoinCode,
    sender: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<Arc<GameSession>>,
    subscribers: Arc<Subscribers>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn code(&self) -> &JoinCode {
        &self.code
    }

    /// The latest published state. Never waits on the actor.
    pub fn snapshot(&self) -> Arc<GameSession> {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> GameStatus {
        self.snapshot.borrow().status
    }

    /// A receiver that wakes on every published change. Its `changed()`
    /// errors once the session is destroyed.
    pub fn watch(&self) -> watch::Receiver<Arc<GameSession>> {
        self.snapshot.clone()
    }

    /// Runs `callback` after every change until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&GameSession) + Send + Sync + 'static,
    {
        let id = self.subscribers.add(Arc::new(callback));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Seats a user. See [`LobbyCoordinator::join`].
    pub async fn join(
        &self,
        profile: PlayerProfile,
    ) -> Result<(Player, Arc<GameSession>), GameError> {
        self.request(|reply| SessionCommand::Join { profile, reply })
            .await
    }

    /// See [`LobbyCoordinator::leave`].
    pub async fn leave(&self, player_id: PlayerId) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::Leave { player_id, reply })
            .await
    }

    /// See [`LobbyCoordinator::kick`].
    pub async fn kick(
        &self,
        requester: PlayerId,
        target: PlayerId,
    ) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::Kick {
            requester,
            target,
            reply,
        })
        .await
    }

    /// See [`LobbyCoordinator::set_active`].
    pub async fn set_active(
        &self,
        player_id: PlayerId,
        active: bool,
    ) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::SetActive {
            player_id,
            active,
            reply,
        })
        .await
    }

    /// Moves the host role off `departed` once they are gone for good.
    /// See [`LobbyCoordinator::migrate_host`].
    pub async fn migrate_host(&self, departed: PlayerId) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::MigrateHost { departed, reply })
            .await
    }

    /// See [`RoundStateMachine::start`].
    pub async fn start(&self, requester: PlayerId) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::Start { requester, reply })
            .await
    }

    /// See [`RoundStateMachine::call_vote`].
    pub async fn call_vote(&self, requester: PlayerId) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::CallVote { requester, reply })
            .await
    }

    /// Casts a ballot. When it completes the box the vote resolves right
    /// away and the returned snapshot already reflects the outcome.
    pub async fn cast_vote(
        &self,
        voter: PlayerId,
        target: PlayerId,
    ) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::CastVote {
            voter,
            target,
            reply,
        })
        .await
    }

    /// See [`RoundStateMachine::force_end`].
    pub async fn force_end(&self, requester: PlayerId) -> Result<Arc<GameSession>, GameError> {
        self.request(|reply| SessionCommand::ForceEnd { requester, reply })
            .await
    }

    /// Stops the actor after it drains the commands queued before this one.
    /// Returns immediately if it is already gone.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Shutdown { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))?;
        reply_rx
            .await
            .map_err(|_| GameError::Unavailable(self.session_id))?
    }
}

// ---------------------------------------------------------------------------
// SessionActor
// ---------------------------------------------------------------------------

struct SessionActor {
    session: GameSession,
    scoring: ScoringRules,
    timer: PhaseTimer,
    rng: StdRng,
    receiver: mpsc::Receiver<SessionCommand>,
    publisher: watch::Sender<Arc<GameSession>>,
    subscribers: Arc<Subscribers>,
}

impl SessionActor {
    async fn run(mut self) {
        let session_id = self.session.id;
        tracing::info!(%session_id, code = %self.session.code, "session actor started");

        let ack = loop {
            tokio::select! {
                command = self.receiver.recv() => {
                    let Some(command) = command else { break None };
                    if let Some(ack) = self.handle(command) {
                        break Some(ack);
                    }
                }
                phase = self.timer.expired() => self.on_timer(phase),
            }
        };

        // Anything still queued gets `Unavailable` when the receiver drops.
        drop(self.receiver);
        tracing::info!(%session_id, "session actor stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Applies one command. Returns the acknowledgement channel when the
    /// command was a shutdown.
    fn handle(&mut self, command: SessionCommand) -> Option<oneshot::Sender<()>> {
        match command {
            SessionCommand::Join { profile, reply } => {
                let user_id = profile.user_id.clone();
                let result = LobbyCoordinator::join(&mut self.session, profile).map(|player| {
                    tracing::info!(
                        session_id = %self.session.id,
                        player_id = %player.id,
                        %user_id,
                        players = self.session.players.len(),
                        "player joined"
                    );
                    (player, self.publish())
                });
                self.reply("join", reply, result);
            }
            SessionCommand::Leave { player_id, reply } => {
                let result = LobbyCoordinator::leave(&mut self.session, player_id).map(|()| {
                    tracing::info!(
                        session_id = %self.session.id,
                        %player_id,
                        players = self.session.players.len(),
                        "player left"
                    );
                    self.publish()
                });
                self.reply("leave", reply, result);
            }
            SessionCommand::Kick {
                requester,
                target,
                reply,
            } => {
                let result =
                    LobbyCoordinator::kick(&mut self.session, requester, target).map(|()| {
                        tracing::info!(
                            session_id = %self.session.id,
                            player_id = %target,
                            "player kicked"
                        );
                        self.publish()
                    });
                self.reply("kick", reply, result);
            }
            SessionCommand::SetActive {
                player_id,
                active,
                reply,
            } => {
                let result = self.set_active(player_id, active);
                self.reply("set_active", reply, result);
            }
            SessionCommand::MigrateHost { departed, reply } => {
                let result = LobbyCoordinator::migrate_host(&mut self.session, departed)
                    .map(|migrated| match migrated {
                        Some(_) => self.publish(),
                        None if self.session.status == GameStatus::Finished => self.publish(),
                        None => self.publisher.borrow().clone(),
                    });
                self.reply("migrate_host", reply, result);
            }
            SessionCommand::Start { requester, reply } => {
                let result = RoundStateMachine::start(&mut self.session, requester, &mut self.rng)
                    .map(|()| {
                        tracing::info!(
                            session_id = %self.session.id,
                            players = self.session.players.len(),
                            impostors = self.session.impostor_count,
                            "game started"
                        );
                        self.publish()
                    });
                self.reply("start", reply, result);
            }
            SessionCommand::CallVote { requester, reply } => {
                let result = RoundStateMachine::call_vote(&mut self.session, requester).map(|()| {
                    tracing::info!(
                        session_id = %self.session.id,
                        round = self.session.round,
                        "voting opened by host"
                    );
                    self.publish()
                });
                self.reply("call_vote", reply, result);
            }
            SessionCommand::CastVote {
                voter,
                target,
                reply,
            } => {
                let result = self.cast_vote(voter, target);
                self.reply("cast_vote", reply, result);
            }
            SessionCommand::ForceEnd { requester, reply } => {
                let result = RoundStateMachine::force_end(&mut self.session, requester).map(|()| {
                    tracing::info!(session_id = %self.session.id, "game force-ended by host");
                    self.publish()
                });
                self.reply("force_end", reply, result);
            }
            SessionCommand::Shutdown { reply } => {
                tracing::info!(session_id = %self.session.id, "session shutting down");
                return Some(reply);
            }
        }
        None
    }

    fn cast_vote(
        &mut self,
        voter: PlayerId,
        target: PlayerId,
    ) -> Result<Arc<GameSession>, GameError> {
        VoteTally::cast_vote(&mut self.session, voter, target)?;
        self.resolve_if_complete()?;
        Ok(self.publish())
    }

    /// A player dropping mid-vote may be the last ballot being waited on.
    fn set_active(
        &mut self,
        player_id: PlayerId,
        active: bool,
    ) -> Result<Arc<GameSession>, GameError> {
        LobbyCoordinator::set_active(&mut self.session, player_id, active)?;
        if !active {
            self.resolve_if_complete()?;
        }
        Ok(self.publish())
    }

    fn resolve_if_complete(&mut self) -> Result<(), GameError> {
        if self.session.status == GameStatus::Voting && VoteTally::all_voted(&self.session) {
            self.resolve_voting()?;
        }
        Ok(())
    }

    fn resolve_voting(&mut self) -> Result<(), GameError> {
        let result = RoundStateMachine::resolve_voting(&mut self.session, &self.scoring)?;
        if let Some(winner) = result.winner {
            tracing::info!(
                session_id = %self.session.id,
                %winner,
                rounds = result.round,
                "game finished"
            );
        }
        Ok(())
    }

    fn on_timer(&mut self, phase: Phase) {
        self.timer.disarm();
        let outcome = match phase.status {
            GameStatus::InProgress => {
                tracing::info!(
                    session_id = %self.session.id,
                    round = phase.round,
                    "round timer elapsed, voting opened"
                );
                RoundStateMachine::open_voting(&mut self.session)
            }
            GameStatus::Voting => {
                tracing::info!(
                    session_id = %self.session.id,
                    round = phase.round,
                    "voting timer elapsed"
                );
                self.resolve_voting()
            }
            GameStatus::Lobby | GameStatus::Finished => Ok(()),
        };
        match outcome {
            Ok(()) => {
                self.publish();
            }
            Err(error) => {
                tracing::warn!(session_id = %self.session.id, %error, "timer transition failed");
            }
        }
    }

    /// Re-arms the phase timer, then publishes a snapshot to watchers and
    /// subscribers.
    fn publish(&mut self) -> Arc<GameSession> {
        self.timer.sync(&mut self.session);
        let snapshot = Arc::new(self.session.clone());
        self.publisher.send_replace(Arc::clone(&snapshot));
        self.subscribers.notify(&snapshot);
        snapshot
    }

    fn reply<T>(&self, op: &'static str, reply: Reply<T>, result: Result<T, GameError>) {
        if let Err(error) = &result {
            tracing::debug!(session_id = %self.session.id, op, %error, "command rejected");
        }
        let _ = reply.send(result);
    }
}

/// Spawns a session actor and returns a handle to it.
///
/// `buffer` bounds the command channel; senders wait when it is full. A
/// zero buffer is raised to one.
pub(crate) fn spawn_session(
    session: GameSession,
    settings: &SessionSettings,
    rng: StdRng,
    buffer: usize,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let session_id = session.id;
    let code = session.code.clone();
    let (publisher, snapshot) = watch::channel(Arc::new(session.clone()));
    let subscribers = Arc::new(Subscribers::default());

    let actor = SessionActor {
        session,
        scoring: settings.scoring,
        timer: PhaseTimer::new(settings.round_duration, settings.voting_duration),
        rng,
        receiver: rx,
        publisher,
        subscribers: Arc::clone(&subscribers),
    };

    tokio::spawn(actor.run());

    SessionHandle {
        session_id,
        code,
        sender: tx,
        snapshot,
        subscribers,
    }
}
