//! Error types for mpd-player

use mpd_client::MpdError;
use thiserror::Error;

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors raised by the player
///
/// Most variants mean the daemon link is unusable. Callers are expected to
/// hand those to a supervisor that decides whether the process goes down,
/// see [`PlayerError::is_fatal`].
#[derive(Debug, Error)]
pub enum PlayerError {
    /// No connection to the daemon could be established
    #[error("Failed to connect to daemon at {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: MpdError,
    },

    /// A daemon command failed
    #[error("Daemon command '{command}' failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: MpdError,
    },

    /// The change notification subscription could not be set up
    #[error("Failed to watch daemon events: {0}")]
    Watch(#[source] MpdError),

    /// The daemon process could not be started
    #[error("Failed to start daemon '{bin}': {output}")]
    DaemonSpawn { bin: String, output: String },

    /// A background thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The player has been closed
    #[error("Player has been closed")]
    Closed,
}

impl PlayerError {
    pub(crate) fn command(command: &'static str) -> impl FnOnce(MpdError) -> Self {
        move |source| PlayerError::Command { command, source }
    }

    /// Whether the error leaves the player without a usable daemon link
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PlayerError::Config(_) | PlayerError::Closed)
    }
}
