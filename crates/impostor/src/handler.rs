//! Per-connection handler: handshake, auth, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Resume from token, or authenticate → Identity
//!   3. Send HandshakeAck; re-seat the user if they were in a session
//!   4. Loop: client frames → session operations; session changes →
//!      redacted `SessionState` pushes

use std::sync::Arc;
use std::time::Instant;

use impostor_identity::{Authenticator, Identity, Presence, Seat};
use impostor_lobby::{GameError, GameSession, PlayerProfile, SessionHandle, SessionSettings};
use impostor_protocol::{
    ClientMessage, Codec, Envelope, ErrorKind, Payload, PlayerId, ProtocolError, ServerMessage,
    UserId,
};
use tokio::sync::watch;

use crate::ImpostorError;
use crate::error::identity_kind;
use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::ws::WsConnection;

/// Drop guard that marks the user disconnected when the handler exits.
///
/// Their seat is kept and flagged inactive so a resume can pick it up
/// again. Since `Drop` is synchronous, the async part runs in a
/// fire-and-forget task.
struct PresenceGuard<A: Authenticator, C: Codec> {
    user_id: UserId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for PresenceGuard<A, C> {
    fn drop(&mut self) {
        let user_id = self.user_id.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let seat = state.presence.lock().await.disconnect(&user_id);
            if let Ok(Some(seat)) = seat {
                deactivate_seat(&state, &user_id, seat).await;
            }
        });
    }
}

/// Flags a dropped user's seat inactive, unless they have reconnected in
/// the meantime.
///
/// The presence lock is held across the actor call, so a resume waits for
/// it and its own `set_active(true)` always lands last.
async fn deactivate_seat<A: Authenticator, C: Codec>(
    state: &ServerState<A, C>,
    user_id: &UserId,
    seat: Seat,
) {
    let Ok(handle) = state.registry.lock().await.get(seat.session_id) else {
        return;
    };
    let presence = state.presence.lock().await;
    if presence.get(user_id).is_some_and(Presence::is_connected) {
        tracing::debug!(%user_id, "user reconnected before seat was released");
        return;
    }
    if let Err(e) = handle.set_active(seat.player_id, false).await {
        tracing::debug!(%user_id, error = %e, "could not mark seat inactive");
    }
    drop(presence);
}

/// The session this connection's user is seated in.
struct Seated {
    handle: SessionHandle,
    player_id: PlayerId,
    updates: watch::Receiver<Arc<GameSession>>,
}

impl Seated {
    fn new(handle: SessionHandle, player_id: PlayerId) -> Self {
        let mut updates = handle.watch();
        updates.borrow_and_update();
        Self {
            handle,
            player_id,
            updates,
        }
    }

    /// Latest snapshot, marking it seen so the update branch skips it.
    fn latest(&mut self) -> Arc<GameSession> {
        self.updates.borrow_and_update().clone()
    }
}

/// Outbound half of a connection: sequence numbering and encoding.
struct Outbox<'a, C: Codec> {
    conn: &'a WsConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<C: Codec> Outbox<'_, C> {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), ImpostorError> {
        let envelope = Envelope {
            seq: next_seq(&mut self.seq),
            timestamp: self.start.elapsed().as_millis() as u64,
            payload: Payload::Server(msg),
        };
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn send_error(&mut self, kind: ErrorKind, message: &str) -> Result<(), ImpostorError> {
        self.send(ServerMessage::Error {
            code: kind.code(),
            kind,
            message: message.to_string(),
        })
        .await
    }

    async fn send_game_error(&mut self, err: &GameError) -> Result<(), ImpostorError> {
        self.send_error(err.kind(), &err.to_string()).await
    }

    async fn send_state(&mut self, seated: &mut Seated) -> Result<(), ImpostorError> {
        let session = seated.latest();
        self.send(ServerMessage::SessionState {
            session: session.view_for(Some(seated.player_id)),
        })
        .await
    }

    fn server_time(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WsConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), ImpostorError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer(), "handling new connection");

    let mut out = Outbox {
        conn: &conn,
        codec: &state.codec,
        seq: 1,
        start: Instant::now(),
    };

    // --- Step 1: Handshake ---
    let (identity, seat) = perform_handshake(&conn, &state, &mut out).await?;
    let user_id = identity.user_id.clone();
    tracing::info!(%conn_id, %user_id, "user authenticated");

    let _guard = PresenceGuard {
        user_id: user_id.clone(),
        state: Arc::clone(&state),
    };

    let mut seated = match seat {
        Some(seat) => reattach(&state, &user_id, seat).await,
        None => None,
    };
    if let Some(seated) = seated.as_mut() {
        announce_seat(&mut out, seated).await?;
    }

    // --- Step 2: Message loop ---
    let idle = state.config.idle_timeout;
    let mut deadline = tokio::time::Instant::now() + idle;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%user_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "recv error");
                        break;
                    }
                };
                deadline = tokio::time::Instant::now() + idle;

                let msg = match state.codec.decode::<Envelope>(&data) {
                    Ok(Envelope { payload: Payload::Client(msg), .. }) => msg,
                    Ok(_) => {
                        out.send_error(ErrorKind::BadRequest, "expected a client message").await?;
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(%user_id, error = %e, "failed to decode envelope");
                        out.send_error(ErrorKind::BadRequest, &e.to_string()).await?;
                        continue;
                    }
                };

                let close = handle_client_message(&state, &identity, &mut seated, &mut out, msg)
                    .await?;
                if close {
                    break;
                }
            }
            update = next_update(&mut seated) => {
                push_update(&state, &user_id, &mut seated, &mut out, update).await?;
            }
            () = tokio::time::sleep_until(deadline) => {
                tracing::info!(%user_id, "connection timed out");
                out.send(ServerMessage::Disconnect { reason: "idle timeout".into() }).await?;
                break;
            }
        }
    }

    let _ = conn.close().await;
    // _guard drops here → presence disconnect fires.
    Ok(())
}

/// Performs the handshake: receive Handshake, validate, resume or
/// authenticate, send Ack.
async fn perform_handshake<A, C>(
    conn: &WsConnection,
    state: &ServerState<A, C>,
    out: &mut Outbox<'_, C>,
) -> Result<(Identity, Option<Seat>), ImpostorError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(handshake_failed("connection closed before handshake"));
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(handshake_failed("handshake timed out"));
        }
    };

    let envelope: Envelope = state.codec.decode(&data)?;
    let (version, token, resume_token) = match envelope.payload {
        Payload::Client(ClientMessage::Handshake {
            version,
            token,
            resume_token,
        }) => (version, token, resume_token),
        _ => {
            out.send_error(ErrorKind::BadRequest, "expected Handshake").await?;
            return Err(handshake_failed("first message must be Handshake"));
        }
    };

    if version != PROTOCOL_VERSION {
        out.send_error(
            ErrorKind::BadRequest,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(handshake_failed("protocol version mismatch"));
    }

    // A valid resume token skips the identity provider entirely.
    if let Some(resume_token) = resume_token {
        let resumed = {
            let mut presence = state.presence.lock().await;
            presence
                .resume(&resume_token)
                .map(|p| (p.identity.clone(), p.seat, p.resume_token.clone()))
        };
        match resumed {
            Ok((identity, seat, token)) => {
                send_ack(out, &identity, token).await?;
                return Ok((identity, seat));
            }
            Err(e) if token.is_none() => {
                out.send_error(identity_kind(&e), &e.to_string()).await?;
                return Err(e.into());
            }
            Err(e) => {
                tracing::debug!(error = %e, "resume failed, falling back to token");
            }
        }
    }

    let identity = match state.auth.authenticate(token.as_deref().unwrap_or("")).await {
        Ok(identity) => identity,
        Err(e) => {
            out.send_error(ErrorKind::Unauthorized, "unauthorized").await?;
            return Err(e.into());
        }
    };

    let connected = {
        let mut presence = state.presence.lock().await;
        presence
            .connect(identity)
            .map(|p| (p.identity.clone(), p.seat, p.resume_token.clone()))
    };
    match connected {
        Ok((identity, seat, token)) => {
            send_ack(out, &identity, token).await?;
            Ok((identity, seat))
        }
        Err(e) => {
            out.send_error(identity_kind(&e), &e.to_string()).await?;
            Err(e.into())
        }
    }
}

fn handshake_failed(reason: &str) -> ImpostorError {
    ProtocolError::InvalidMessage(reason.to_string()).into()
}

async fn send_ack<C: Codec>(
    out: &mut Outbox<'_, C>,
    identity: &Identity,
    resume_token: String,
) -> Result<(), ImpostorError> {
    let server_time = out.server_time();
    out.send(ServerMessage::HandshakeAck {
        user_id: identity.user_id.clone(),
        display_name: identity.display_name.clone(),
        resume_token,
        server_time,
    })
    .await
}

/// Handles one client request. Returns `true` if the connection should
/// close. Game errors go back to the client; only transport and codec
/// failures end the connection.
async fn handle_client_message<A, C>(
    state: &ServerState<A, C>,
    identity: &Identity,
    seated: &mut Option<Seated>,
    out: &mut Outbox<'_, C>,
    msg: ClientMessage,
) -> Result<bool, ImpostorError>
where
    A: Authenticator,
    C: Codec,
{
    let user_id = &identity.user_id;
    match msg {
        ClientMessage::Heartbeat { client_time } => {
            let server_time = out.server_time();
            out.send(ServerMessage::HeartbeatAck {
                client_time,
                server_time,
            })
            .await?;
        }

        ClientMessage::Handshake { .. } => {
            out.send_error(ErrorKind::BadRequest, "already handshaken").await?;
        }

        ClientMessage::Disconnect { reason } => {
            tracing::info!(%user_id, %reason, "client disconnected");
            return Ok(true);
        }

        ClientMessage::CreateSession {
            max_players,
            impostor_count,
        } => {
            if let Some(current) = active_seat(seated) {
                let message = format!("already in session {}", current.handle.session_id());
                out.send_error(ErrorKind::InvalidState, &message).await?;
                return Ok(false);
            }
            let defaults = &state.config.session_defaults;
            let settings = SessionSettings {
                max_players: max_players.unwrap_or(defaults.max_players),
                impostor_count: impostor_count.unwrap_or(defaults.impostor_count),
                ..defaults.clone()
            };
            // Lock only for the create, drop before network I/O.
            let created = state
                .registry
                .lock()
                .await
                .create(profile(identity), settings);
            match created {
                Ok(handle) => {
                    let host_id = handle.snapshot().host_id;
                    let seat = take_seat(state, user_id, handle, host_id).await;
                    announce_seat(out, seated.insert(seat)).await?;
                }
                Err(e) => out.send_game_error(&e).await?,
            }
        }

        ClientMessage::JoinSession { code } => {
            let found = state.registry.lock().await.find_by_code(&code);
            let handle = match found {
                Ok(handle) => handle,
                Err(e) => {
                    out.send_game_error(&e).await?;
                    return Ok(false);
                }
            };
            if let Some(current) = active_seat(seated) {
                if current.handle.session_id() != handle.session_id() {
                    let message = format!("already in session {}", current.handle.session_id());
                    out.send_error(ErrorKind::InvalidState, &message).await?;
                    return Ok(false);
                }
            }
            match handle.join(profile(identity)).await {
                Ok((player, _)) => {
                    let seat = take_seat(state, user_id, handle, player.id).await;
                    announce_seat(out, seated.insert(seat)).await?;
                }
                Err(e) => out.send_game_error(&e).await?,
            }
        }

        ClientMessage::LeaveSession => {
            let Some(current) = seated.as_ref() else {
                out.send_error(ErrorKind::InvalidState, "not in a session").await?;
                return Ok(false);
            };
            match current.handle.leave(current.player_id).await {
                Ok(_) => {
                    let session_id = current.handle.session_id();
                    unseat(state, user_id, seated).await;
                    out.send(ServerMessage::SessionLeft { session_id }).await?;
                }
                Err(e) => out.send_game_error(&e).await?,
            }
        }

        msg @ (ClientMessage::StartGame
        | ClientMessage::CallVote
        | ClientMessage::CastVote { .. }
        | ClientMessage::KickPlayer { .. }
        | ClientMessage::ForceEnd) => {
            let Some(current) = seated.as_mut() else {
                out.send_error(ErrorKind::InvalidState, "not in a session").await?;
                return Ok(false);
            };
            let me = current.player_id;
            let handle = &current.handle;
            let result = match msg {
                ClientMessage::StartGame => handle.start(me).await,
                ClientMessage::CallVote => handle.call_vote(me).await,
                ClientMessage::CastVote { target } => handle.cast_vote(me, target).await,
                ClientMessage::KickPlayer { target } => handle.kick(me, target).await,
                _ => handle.force_end(me).await,
            };
            match result {
                Ok(_) => out.send_state(current).await?,
                Err(e) => out.send_game_error(&e).await?,
            }
        }
    }

    Ok(false)
}

/// The current seat, if its session is still running.
fn active_seat(seated: &Option<Seated>) -> Option<&Seated> {
    seated
        .as_ref()
        .filter(|s| s.handle.status().is_active())
}

fn profile(identity: &Identity) -> PlayerProfile {
    PlayerProfile {
        user_id: identity.user_id.clone(),
        display_name: identity.display_name.clone(),
        avatar_url: identity.avatar_url.clone(),
    }
}

async fn take_seat<A: Authenticator, C: Codec>(
    state: &ServerState<A, C>,
    user_id: &UserId,
    handle: SessionHandle,
    player_id: PlayerId,
) -> Seated {
    let seat = Seat {
        session_id: handle.session_id(),
        player_id,
    };
    if let Err(e) = state.presence.lock().await.set_seat(user_id, Some(seat)) {
        tracing::warn!(%user_id, error = %e, "could not record seat");
    }
    Seated::new(handle, player_id)
}

async fn unseat<A: Authenticator, C: Codec>(
    state: &ServerState<A, C>,
    user_id: &UserId,
    seated: &mut Option<Seated>,
) {
    *seated = None;
    let _ = state.presence.lock().await.set_seat(user_id, None);
}

async fn announce_seat<C: Codec>(
    out: &mut Outbox<'_, C>,
    seated: &mut Seated,
) -> Result<(), ImpostorError> {
    out.send(ServerMessage::SessionJoined {
        session_id: seated.handle.session_id(),
        player_id: seated.player_id,
        code: seated.handle.code().to_string(),
    })
    .await?;
    out.send_state(seated).await
}

/// Puts a resumed user back into the session they held, marked active.
async fn reattach<A: Authenticator, C: Codec>(
    state: &ServerState<A, C>,
    user_id: &UserId,
    seat: Seat,
) -> Option<Seated> {
    let handle = state.registry.lock().await.get(seat.session_id);
    let reattached = match handle {
        Ok(handle) => match handle.set_active(seat.player_id, true).await {
            Ok(_) => Some(Seated::new(handle, seat.player_id)),
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "seat no longer valid");
                None
            }
        },
        Err(_) => None,
    };
    if reattached.is_none() {
        let _ = state.presence.lock().await.set_seat(user_id, None);
    }
    reattached
}

/// Waits for the seated session to change. `None` means it was destroyed.
/// Pends forever while the user is not seated.
async fn next_update(seated: &mut Option<Seated>) -> Option<Arc<GameSession>> {
    match seated {
        Some(seated) => match seated.updates.changed().await {
            Ok(()) => Some(seated.latest()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

async fn push_update<A: Authenticator, C: Codec>(
    state: &ServerState<A, C>,
    user_id: &UserId,
    seated: &mut Option<Seated>,
    out: &mut Outbox<'_, C>,
    update: Option<Arc<GameSession>>,
) -> Result<(), ImpostorError> {
    let Some(current) = seated.as_ref() else {
        return Ok(());
    };
    let session_id = current.handle.session_id();
    let player_id = current.player_id;

    match update {
        Some(session) if session.player(player_id).is_some() => {
            out.send(ServerMessage::SessionState {
                session: session.view_for(Some(player_id)),
            })
            .await
        }
        // Kicked, or the session was destroyed.
        _ => {
            tracing::info!(%user_id, %session_id, "user removed from session");
            unseat(state, user_id, seated).await;
            out.send(ServerMessage::SessionLeft { session_id }).await
        }
    }
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
