//! Session lifecycle and lobby coordination for Impostor.
//!
//! Each game session runs as an isolated Tokio task (actor model) that owns
//! its [`GameSession`]. Everything that changes a session goes through the
//! actor; reads use published snapshots.
//!
//! # Key types
//!
//! - [`SessionRegistry`]: creates sessions, owns join codes, finds and
//!   destroys sessions
//! - [`SessionHandle`]: send commands to a running session actor, read
//!   snapshots, subscribe to changes
//! - [`LobbyCoordinator`]: join, leave, kick
//! - [`RoleAssigner`]: picks the impostors at start
//! - [`RoundStateMachine`]: status transitions, win check, scoring
//! - [`VoteTally`]: ballots and plurality resolution
//! - [`SessionSettings`] / [`RegistryConfig`]: tunables

mod actor;
mod code;
mod config;
mod error;
mod lobby;
mod model;
mod registry;
mod roles;
mod round;
mod tally;
mod timer;

pub use actor::{SessionCallback, SessionHandle, Subscription};
pub use code::{CodeGenerator, DEFAULT_ALPHABET, DEFAULT_CODE_LENGTH, JoinCode};
pub use config::{RegistryConfig, ScoringRules, SessionSettings};
pub use error::{GameError, Missing};
pub use lobby::LobbyCoordinator;
pub use model::{Ballot, GameSession, Player, PlayerProfile};
pub use registry::SessionRegistry;
pub use roles::RoleAssigner;
pub use round::RoundStateMachine;
pub use tally::VoteTally;
