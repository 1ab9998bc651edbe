//! Forwarding of daemon change notifications
//!
//! The daemon reports changes per subsystem. Only two matter here: `player`
//! (transport state) and `mixer` (volume). Each one triggers a status
//! reconciliation, except that `player` notifications shortly after our own
//! track switch are dropped: switching tracks makes the daemon emit a
//! stop/play pair that must not be mistaken for an external stop.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, TryRecvError};
use crossbeam::select;
use mpd_client::MpdError;
use parking_lot::Mutex;

use crate::PlayerError;

/// Daemon subsystems the player subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Player,
    Mixer,
}

impl Subsystem {
    pub const ALL: [Subsystem; 2] = [Subsystem::Player, Subsystem::Mixer];

    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Player => "player",
            Subsystem::Mixer => "mixer",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Subsystem::Player),
            "mixer" => Ok(Subsystem::Mixer),
            other => Err(format!("unknown subsystem '{}'", other)),
        }
    }
}

/// Suppression window for player notifications after a track switch
#[derive(Debug)]
pub struct SwitchDebounce {
    window: Duration,
    last_switch: Mutex<Option<Instant>>,
}

impl SwitchDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_switch: Mutex::new(None),
        }
    }

    /// Record that we just switched tracks
    pub fn mark_switch(&self) {
        *self.last_switch.lock() = Some(Instant::now());
    }

    /// Whether a notification for `subsystem` should trigger reconciliation
    pub fn should_reconcile(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Mixer => true,
            Subsystem::Player => match *self.last_switch.lock() {
                Some(at) => at.elapsed() >= self.window,
                None => true,
            },
        }
    }
}

enum Wake {
    Closed,
    Event(String),
    Failed(MpdError),
}

/// Spawn the thread forwarding notifications to `on_change`
///
/// The loop ends when `close` fires (a message or disconnection) or when the
/// subscription fails. A failure outside of shutdown is handed to `on_fault`
/// as [`PlayerError::Watch`].
pub(crate) fn spawn_watch_loop(
    events: Receiver<String>,
    errors: Receiver<MpdError>,
    close: Receiver<()>,
    debounce: Arc<SwitchDebounce>,
    on_change: impl Fn(Subsystem) + Send + 'static,
    on_fault: impl FnOnce(PlayerError) + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("player-watch".to_string())
        .spawn(move || {
            tracing::debug!("Watch loop started");
            let failure = loop {
                let wake = select! {
                    recv(close) -> _ => Wake::Closed,
                    recv(events) -> event => match event {
                        Ok(name) => Wake::Event(name),
                        // The reason, if any, is on the error channel
                        Err(_) => Wake::Failed(errors.try_recv().unwrap_or(MpdError::Closed)),
                    },
                    recv(errors) -> error => Wake::Failed(error.unwrap_or(MpdError::Closed)),
                };

                let name = match wake {
                    Wake::Closed => break None,
                    Wake::Failed(e) => break Some(e),
                    Wake::Event(name) => name,
                };

                let subsystem = match name.parse::<Subsystem>() {
                    Ok(subsystem) => subsystem,
                    Err(e) => {
                        tracing::debug!("Ignoring daemon event: {}", e);
                        continue;
                    }
                };

                if debounce.should_reconcile(subsystem) {
                    tracing::debug!("Daemon {} changed, reconciling", subsystem);
                    on_change(subsystem);
                } else {
                    tracing::debug!("Suppressed {} event right after track switch", subsystem);
                }
            };

            if let Some(e) = failure {
                if matches!(close.try_recv(), Err(TryRecvError::Disconnected)) {
                    tracing::debug!("Daemon event stream ended during shutdown: {}", e);
                } else {
                    tracing::error!("Daemon event stream failed: {}", e);
                    on_fault(PlayerError::Watch(e));
                }
            }
            tracing::debug!("Watch loop stopped");
        })
}
