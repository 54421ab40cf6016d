//! Connection presence: who is online, who dropped, who may resume.
//!
//! A mobile client loses its socket all the time (tunnel, app switch,
//! flaky Wi-Fi). Removing the player from a running game every time that
//! happens would break the role-count invariants, so the server keeps a
//! presence record per user instead:
//!
//! ```text
//!   Connected ──(disconnect)──→ Disconnected ──(grace elapsed)──→ Expired
//!       ↑                            │
//!       └──────(resume token)────────┘
//! ```
//!
//! `PresenceTracker` is a plain single-owner structure; the server wraps it
//! in a mutex.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use impostor_protocol::{PlayerId, SessionId, UserId};
use rand::Rng;

use crate::{Identity, IdentityError};

/// Presence tuning.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// How long a dropped client may take to resume before its record
    /// expires. Zero disables resumption.
    pub resume_grace: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            resume_grace: Duration::from_secs(30),
        }
    }
}

/// Connection state of one user.
#[derive(Debug, Clone)]
pub enum PresenceState {
    Connected,
    /// Dropped at `since`; may resume until `since + resume_grace`.
    Disconnected { since: Instant },
    Expired,
}

/// Where a user is seated, so a resumed or expired connection can find its
/// game again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub session_id: SessionId,
    pub player_id: PlayerId,
}

/// The server's record of one user's connection.
#[derive(Debug, Clone)]
pub struct Presence {
    pub identity: Identity,
    pub state: PresenceState,
    /// 32 hex characters (128 bits). Only the server and this client know it.
    pub resume_token: String,
    pub seat: Option<Seat>,
}

impl Presence {
    pub fn is_connected(&self) -> bool {
        matches!(self.state, PresenceState::Connected)
    }
}

/// Tracks presence for every authenticated user.
pub struct PresenceTracker {
    records: HashMap<UserId, Presence>,
    /// Resume token → user, kept in sync with `records`.
    tokens: HashMap<String, UserId>,
    config: PresenceConfig,
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            records: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    /// Records a fresh, authenticated connection and issues a resume token.
    ///
    /// A stale (disconnected or expired) record for the same user is
    /// replaced, but its seat is carried over so the user lands back in
    /// their game.
    ///
    /// # Errors
    /// [`IdentityError::AlreadyConnected`] if the user already has a live
    /// connection.
    pub fn connect(&mut self, identity: Identity) -> Result<&Presence, IdentityError> {
        let user_id = identity.user_id.clone();
        let mut seat = None;

        if let Some(existing) = self.records.get(&user_id) {
            if existing.is_connected() {
                return Err(IdentityError::AlreadyConnected(user_id));
            }
            if !matches!(existing.state, PresenceState::Expired) {
                seat = existing.seat;
            }
            self.tokens.remove(&existing.resume_token);
        }

        let token = generate_token();
        self.tokens.insert(token.clone(), user_id.clone());
        let presence = self.records.entry(user_id.clone()).or_insert(Presence {
            identity: identity.clone(),
            state: PresenceState::Connected,
            resume_token: String::new(),
            seat: None,
        });
        presence.identity = identity;
        presence.state = PresenceState::Connected;
        presence.resume_token = token;
        presence.seat = seat;

        tracing::info!(%user_id, "user connected");
        Ok(&*presence)
    }

    /// Marks the user's connection as dropped and starts the grace period.
    ///
    /// # Errors
    /// [`IdentityError::NotFound`] if no record exists.
    pub fn disconnect(&mut self, user_id: &UserId) -> Result<Option<Seat>, IdentityError> {
        let presence = self
            .records
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))?;

        presence.state = PresenceState::Disconnected {
            since: Instant::now(),
        };
        tracing::info!(%user_id, "user disconnected, resume window open");
        Ok(presence.seat)
    }

    /// Restores a dropped connection from its resume token.
    ///
    /// # Errors
    /// - [`IdentityError::InvalidToken`]: token unknown
    /// - [`IdentityError::Expired`]: grace period elapsed
    /// - [`IdentityError::AlreadyConnected`]: the old connection is live
    pub fn resume(&mut self, token: &str) -> Result<&Presence, IdentityError> {
        let user_id = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)?;
        let grace = self.config.resume_grace;
        let presence = self
            .records
            .get_mut(&user_id)
            .ok_or(IdentityError::InvalidToken)?;

        match presence.state {
            PresenceState::Disconnected { since } if since.elapsed() >= grace => {
                presence.state = PresenceState::Expired;
                Err(IdentityError::Expired(user_id))
            }
            PresenceState::Disconnected { .. } => {
                presence.state = PresenceState::Connected;
                tracing::info!(%user_id, "user resumed");
                Ok(&*presence)
            }
            PresenceState::Connected => Err(IdentityError::AlreadyConnected(user_id)),
            PresenceState::Expired => Err(IdentityError::Expired(user_id)),
        }
    }

    /// Records (or clears) the seat a user occupies.
    ///
    /// # Errors
    /// [`IdentityError::NotFound`] if no record exists.
    pub fn set_seat(&mut self, user_id: &UserId, seat: Option<Seat>) -> Result<(), IdentityError> {
        let presence = self
            .records
            .get_mut(user_id)
            .ok_or_else(|| IdentityError::NotFound(user_id.clone()))?;
        presence.seat = seat;
        Ok(())
    }

    /// Expires every record whose grace period has elapsed and returns
    /// copies of them, so the caller can release their seats before
    /// [`cleanup_expired`](Self::cleanup_expired) deletes them.
    pub fn expire_stale(&mut self) -> Vec<Presence> {
        let grace = self.config.resume_grace;
        let mut expired = Vec::new();

        for presence in self.records.values_mut() {
            if let PresenceState::Disconnected { since } = presence.state {
                if since.elapsed() >= grace {
                    presence.state = PresenceState::Expired;
                    tracing::info!(user_id = %presence.identity.user_id, "presence expired");
                    expired.push(presence.clone());
                }
            }
        }

        expired
    }

    /// Removes expired records and invalidates their tokens.
    pub fn cleanup_expired(&mut self) {
        let tokens = &mut self.tokens;
        self.records.retain(|_, presence| {
            if matches!(presence.state, PresenceState::Expired) {
                tokens.remove(&presence.resume_token);
                false
            } else {
                true
            }
        });
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Presence> {
        self.records.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 16 random bytes rendered as 32 lowercase hex characters.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
