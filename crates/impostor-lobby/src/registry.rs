//! Session registry: creates sessions, owns join codes, finds and destroys
//! sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use impostor_protocol::{GameStatus, SessionId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actor::spawn_session;
use crate::error::Missing;
use crate::{
    CodeGenerator, GameError, GameSession, JoinCode, PlayerProfile, RegistryConfig,
    SessionHandle, SessionSettings,
};

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks every live session and the join code each one holds.
///
/// A code belongs to at most one non-finished session. Once a session
/// finishes its code may be handed to a new session, even before the
/// finished one is garbage-collected.
///
/// The registry itself is not synchronized; the server wraps it in a
/// `tokio::sync::Mutex`. Session state lives in the actors, so the lock is
/// only held for map lookups, never across a game operation.
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionHandle>,
    codes: HashMap<JoinCode, SessionId>,
    generator: CodeGenerator,
    config: RegistryConfig,
    rng: StdRng,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SessionRegistry {
    /// Creates an empty registry using the default join code alphabet.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_generator(config, CodeGenerator::default())
    }

    /// Creates an empty registry drawing codes from `generator`.
    pub fn with_generator(config: RegistryConfig, generator: CodeGenerator) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            sessions: HashMap::new(),
            codes: HashMap::new(),
            generator,
            config,
            rng,
        }
    }

    /// Starts a new session in the lobby with `host` as its first player.
    ///
    /// # Errors
    /// - `InvalidSettings` if `settings` fail validation.
    /// - `CapacityExhausted` if no free code turned up within
    ///   `max_code_attempts` draws.
    pub fn create(
        &mut self,
        host: PlayerProfile,
        settings: SessionSettings,
    ) -> Result<SessionHandle, GameError> {
        settings.validate()?;
        let code = self.draw_code()?;

        let session_id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        let host_user = host.user_id.clone();
        let session = GameSession::new(session_id, code.clone(), host, &settings);
        let rng = StdRng::seed_from_u64(self.rng.random());
        let handle = spawn_session(session, &settings, rng, self.config.command_buffer);

        self.codes.insert(code.clone(), session_id);
        self.sessions.insert(session_id, handle.clone());
        tracing::info!(
            %session_id,
            %code,
            host = %host_user,
            max_players = settings.max_players,
            impostors = settings.impostor_count,
            "session created"
        );
        Ok(handle)
    }

    /// Looks up an active session by join code. Case-insensitive; ignores
    /// surrounding whitespace.
    ///
    /// # Errors
    /// Returns `NotFound` when no non-finished session holds the code.
    pub fn find_by_code(&self, code: &str) -> Result<SessionHandle, GameError> {
        let code = JoinCode::normalize(code);
        self.codes
            .get(&code)
            .and_then(|id| self.sessions.get(id))
            .filter(|handle| handle.status().is_active())
            .cloned()
            .ok_or(GameError::NotFound(Missing::Code(code.to_string())))
    }

    /// Looks up a session by id, finished or not.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown or destroyed sessions.
    pub fn get(&self, session_id: SessionId) -> Result<SessionHandle, GameError> {
        self.sessions
            .get(&session_id)
            .cloned()
            .ok_or(GameError::NotFound(Missing::Session(session_id)))
    }

    /// Removes a session and stops its actor once in-flight commands have
    /// drained. Destroying an unknown session is a no-op.
    ///
    /// Returns `true` if a session was removed.
    pub async fn destroy(&mut self, session_id: SessionId) -> bool {
        let Some(handle) = self.remove(session_id) else {
            return false;
        };
        handle.shutdown().await;
        tracing::info!(%session_id, "session destroyed");
        true
    }

    /// Destroys every session that finished at least `retention` ago and
    /// returns their ids.
    pub async fn collect_finished(&mut self, retention: Duration) -> Vec<SessionId> {
        let expired = self.take_finished(retention);
        for handle in &expired {
            handle.shutdown().await;
        }
        expired.iter().map(SessionHandle::session_id).collect()
    }

    /// Unregisters every session that finished at least `retention` ago and
    /// hands back their handles without stopping the actors.
    ///
    /// Callers sharing the registry behind a lock use this to release the
    /// lock before awaiting [`SessionHandle::shutdown`] on each handle.
    pub fn take_finished(&mut self, retention: Duration) -> Vec<SessionHandle> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|handle| {
                let snapshot = handle.snapshot();
                snapshot.status == GameStatus::Finished
                    && snapshot
                        .finished_at
                        .is_some_and(|at| now.signed_duration_since(at) >= retention)
            })
            .map(SessionHandle::session_id)
            .collect();

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "finished sessions collected");
        }
        expired
            .into_iter()
            .filter_map(|session_id| self.remove(session_id))
            .collect()
    }

    /// Number of sessions held, finished ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions that have not finished.
    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|handle| handle.status().is_active())
            .count()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Drops the session and, if it still holds its code, the code.
    fn remove(&mut self, session_id: SessionId) -> Option<SessionHandle> {
        let handle = self.sessions.remove(&session_id)?;
        if self.codes.get(handle.code()) == Some(&session_id) {
            self.codes.remove(handle.code());
        }
        Some(handle)
    }

    /// Draws codes until one is free. A code whose holder has finished (or
    /// is gone) counts as free and is reclaimed.
    fn draw_code(&mut self) -> Result<JoinCode, GameError> {
        let attempts = self.config.max_code_attempts;
        for _ in 0..attempts {
            let code = self.generator.generate(&mut self.rng);
            let taken = self
                .codes
                .get(&code)
                .and_then(|id| self.sessions.get(id))
                .is_some_and(|holder| holder.status().is_active());
            if !taken {
                return Ok(code);
            }
        }
        tracing::warn!(
            attempts,
            capacity = self.generator.capacity(),
            active = self.active_count(),
            "join code space exhausted"
        );
        Err(GameError::CapacityExhausted { attempts })
    }
}
