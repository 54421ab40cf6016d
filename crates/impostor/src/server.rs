//! `ImpostorServer` builder, accept loop and background sweeper.
//!
//! Ties the layers together: WebSocket → protocol → identity → lobby.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use impostor_identity::{Authenticator, PresenceConfig, PresenceTracker};
use impostor_lobby::{RegistryConfig, SessionRegistry, SessionSettings};
use impostor_protocol::{Codec, GameStatus, JsonCodec};
use tokio::sync::Mutex;

use crate::ImpostorError;
use crate::handler::handle_connection;
use crate::ws::{WsConnection, WsListener};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Timeouts and housekeeping intervals.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Settings used when a `CreateSession` request leaves fields out.
    pub session_defaults: SessionSettings,
    /// How long a new connection may take to send its handshake.
    pub handshake_timeout: Duration,
    /// A connection with no client frame for this long is dropped.
    pub idle_timeout: Duration,
    /// How often stale presence records and finished sessions are swept.
    pub sweep_interval: Duration,
    /// How long a finished session stays readable before it is destroyed.
    pub finished_retention: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session_defaults: SessionSettings::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            finished_retention: Duration::from_secs(300),
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Both managers sit behind async mutexes. The registry lock is never held
/// across a session actor call. The presence lock is held across one, in
/// the disconnect path, so a resume cannot interleave with it.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) registry: Mutex<SessionRegistry>,
    pub(crate) presence: Mutex<PresenceTracker>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting an Impostor server.
///
/// ```rust,no_run
/// use impostor::prelude::*;
///
/// # async fn run() -> Result<(), ImpostorError> {
/// let auth = StaticAuthenticator::new()
///     .with_user("token-ada", Identity::new("u-ada", "ada@example.com", Some("Ada")));
/// let server = ImpostorServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(auth)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ImpostorServerBuilder {
    bind_addr: String,
    presence: PresenceConfig,
    registry: RegistryConfig,
    config: ServerConfig,
}

impl ImpostorServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            presence: PresenceConfig::default(),
            registry: RegistryConfig::default(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn presence_config(mut self, config: PresenceConfig) -> Self {
        self.presence = config;
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    pub fn session_defaults(mut self, settings: SessionSettings) -> Self {
        self.config.session_defaults = settings;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn finished_retention(mut self, retention: Duration) -> Self {
        self.config.finished_retention = retention;
        self
    }

    /// Binds the listener and builds the server with the given
    /// authenticator and the JSON codec.
    ///
    /// # Errors
    /// `InvalidSettings` if the session defaults are invalid, or a
    /// transport error if the address cannot be bound.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<ImpostorServer<A, JsonCodec>, ImpostorError> {
        self.config.session_defaults.validate()?;
        let listener = WsListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Mutex::new(SessionRegistry::new(self.registry)),
            presence: Mutex::new(PresenceTracker::new(self.presence)),
            auth,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(ImpostorServer { listener, state })
    }
}

impl Default for ImpostorServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Impostor game server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ImpostorServer<A: Authenticator, C: Codec> {
    listener: WsListener,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> ImpostorServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop and the sweeper until the process ends.
    pub async fn run(self) -> Result<(), ImpostorError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Impostor server running");
        tokio::spawn(sweep_loop(Arc::clone(&self.state)));

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let conn = match WsConnection::upgrade(stream, peer).await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "upgrade failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Periodic housekeeping: expires users whose resume window closed and
/// destroys sessions finished longer than the retention period.
///
/// An expired user's lobby seat is released. In a running game the seat
/// stays, inactive, but if they hosted the host role moves on so the game
/// can still be driven.
async fn sweep_loop<A: Authenticator, C: Codec>(state: Arc<ServerState<A, C>>) {
    let period = state.config.sweep_interval.max(Duration::from_millis(10));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        sweep(&state).await;
    }
}

pub(crate) async fn sweep<A: Authenticator, C: Codec>(state: &ServerState<A, C>) {
    let expired = state.presence.lock().await.expire_stale();

    for presence in expired {
        let Some(seat) = presence.seat else { continue };
        let user_id = &presence.identity.user_id;
        let handle = state.registry.lock().await.get(seat.session_id);
        let Ok(handle) = handle else { continue };
        match handle.status() {
            GameStatus::Lobby => match handle.leave(seat.player_id).await {
                Ok(_) => tracing::info!(
                    %user_id,
                    session_id = %seat.session_id,
                    "expired user removed from lobby"
                ),
                Err(e) => tracing::debug!(%user_id, error = %e, "could not release expired seat"),
            },
            GameStatus::InProgress | GameStatus::Voting => {
                if let Err(e) = handle.migrate_host(seat.player_id).await {
                    tracing::debug!(%user_id, error = %e, "could not migrate host");
                }
            }
            GameStatus::Finished => {}
        }
    }

    state.presence.lock().await.cleanup_expired();

    // Actors drain outside the registry lock.
    let finished = state
        .registry
        .lock()
        .await
        .take_finished(state.config.finished_retention);
    if !finished.is_empty() {
        tracing::info!(count = finished.len(), "finished sessions destroyed");
    }
    for handle in finished {
        handle.shutdown().await;
    }
}
