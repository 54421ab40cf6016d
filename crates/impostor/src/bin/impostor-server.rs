//! Impostor game server.
//!
//! Configuration comes from flags or the matching `IMPOSTOR_*` environment
//! variables. Without an identity provider wired in, users are read from
//! `--user TOKEN=USER_ID[:DISPLAY_NAME]` entries, which is enough for local
//! play and load tests.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use impostor::logging;
use impostor::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "impostor-server")]
#[command(about = "WebSocket server for the Impostor party game")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "IMPOSTOR_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Emit JSON log lines instead of the human-readable format
    #[arg(long, env = "IMPOSTOR_JSON_LOGS")]
    json_logs: bool,

    /// Accepted credential, as TOKEN=USER_ID[:DISPLAY_NAME]. Repeatable.
    #[arg(long = "user", env = "IMPOSTOR_USERS", value_delimiter = ',')]
    users: Vec<String>,

    /// Default roster cap for new sessions
    #[arg(long, env = "IMPOSTOR_MAX_PLAYERS", default_value_t = 10)]
    max_players: usize,

    /// Default number of impostors for new sessions
    #[arg(long, env = "IMPOSTOR_IMPOSTORS", default_value_t = 1)]
    impostor_count: usize,

    /// Discussion phase length in seconds; 0 means the host calls the vote
    #[arg(long, env = "IMPOSTOR_ROUND_SECS", default_value_t = 0)]
    round_secs: u64,

    /// Voting phase length in seconds; 0 waits for every ballot
    #[arg(long, env = "IMPOSTOR_VOTING_SECS", default_value_t = 0)]
    voting_secs: u64,

    /// Seconds a dropped client may take to resume its seat
    #[arg(long, env = "IMPOSTOR_RESUME_GRACE_SECS", default_value_t = 30)]
    resume_grace_secs: u64,

    /// Seconds without any client frame before a connection is dropped
    #[arg(long, env = "IMPOSTOR_IDLE_SECS", default_value_t = 30)]
    idle_secs: u64,

    /// Seconds a finished session stays readable before it is destroyed
    #[arg(long, env = "IMPOSTOR_RETENTION_SECS", default_value_t = 300)]
    retention_secs: u64,
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_user(entry: &str) -> Option<(String, Identity)> {
    let (token, rest) = entry.split_once('=')?;
    let (user_id, name) = match rest.split_once(':') {
        Some((user_id, name)) => (user_id, Some(name)),
        None => (rest, None),
    };
    if token.is_empty() || user_id.is_empty() {
        return None;
    }
    let email = format!("{user_id}@localhost");
    Some((token.to_string(), Identity::new(user_id, email, name)))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(logging::DEFAULT_FILTER, args.json_logs);

    let mut auth = StaticAuthenticator::new();
    for entry in &args.users {
        match parse_user(entry) {
            Some((token, identity)) => auth = auth.with_user(token, identity),
            None => {
                tracing::error!(%entry, "malformed --user entry, expected TOKEN=USER_ID[:NAME]");
                return ExitCode::FAILURE;
            }
        }
    }
    if auth.is_empty() {
        tracing::warn!("no users configured, every handshake will be rejected");
    }

    let defaults = SessionSettings {
        round_duration: optional_secs(args.round_secs),
        voting_duration: optional_secs(args.voting_secs),
        ..SessionSettings::new(args.max_players, args.impostor_count)
    };

    let server = ImpostorServerBuilder::new()
        .bind(&args.bind)
        .presence_config(PresenceConfig {
            resume_grace: Duration::from_secs(args.resume_grace_secs),
        })
        .session_defaults(defaults)
        .idle_timeout(Duration::from_secs(args.idle_secs))
        .finished_retention(Duration::from_secs(args.retention_secs))
        .build(auth)
        .await;

    let server = match server {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    ExitCode::SUCCESS
}
