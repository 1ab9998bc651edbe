use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of source a track is played from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SongKind {
    Mp3,
    Flac,
    /// Any other remote stream
    Url,
}

/// A playable track
///
/// Once handed to the player a track is never modified; a new `play`
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Playable URI
    pub locator: String,
    pub kind: SongKind,
    /// Duration announced by the caller
    pub duration: Duration,
}

impl Track {
    pub fn new(kind: SongKind, locator: impl Into<String>, duration: Duration) -> Self {
        Self {
            locator: locator.into(),
            kind,
            duration,
        }
    }
}
