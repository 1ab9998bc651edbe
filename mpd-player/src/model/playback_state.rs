//! Playback state enumeration

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current playback state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Currently playing audio
    Playing,
    /// Playback is paused
    Paused,
    /// Playback is stopped
    #[default]
    Stopped,
}

impl PlaybackState {
    /// Map the `state` field of a daemon status response
    ///
    /// Handles the values the daemon reports:
    /// - "play"
    /// - "pause"
    /// - "stop"
    ///
    /// Anything else yields `None`.
    pub fn from_daemon_state(state: &str) -> Option<Self> {
        match state {
            "play" => Some(PlaybackState::Playing),
            "pause" => Some(PlaybackState::Paused),
            "stop" => Some(PlaybackState::Stopped),
            _ => None,
        }
    }

    pub fn is_playing(self) -> bool {
        self == PlaybackState::Playing
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}
