//! # mpd-player
//!
//! A sync-first playback controller that keeps a local view of "what is
//! playing" in step with an independently running MPD daemon.
//!
//! ## Overview
//!
//! The daemon is authoritative but asynchronous: it changes state on its own
//! (track end, other clients, mixer changes) and reports that through a
//! best-effort notification stream. The player drives the daemon with
//! commands, simulates the playback position locally so that position
//! updates never need a daemon round trip, and reconciles with the daemon
//! whenever it reports a change.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mpd_player::{ConnectionManager, DaemonProcess, MpdDialer, Player, PlayerConfig, SongKind};
//!
//! let config = PlayerConfig::from_env()?;
//! let connection = Arc::new(ConnectionManager::new(Arc::new(MpdDialer::from_config(&config))));
//! let player = Player::builder()
//!     .daemon_process(DaemonProcess::from_config(&config))
//!     .config(config)
//!     .build(connection)?;
//!
//! player.play(SongKind::Mp3, "http://example.com/song.mp3", Duration::from_secs(215));
//! player.pause()?;
//! player.close();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Player (commands, observation channels)
//!     ↓                         ↑
//! ConnectionManager        watch loop ← DaemonWatch (idle notifications)
//!     ↓
//! DaemonClient (mpd_client)
//! ```

pub mod config;
pub mod connection;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod model;
pub mod timer;
pub mod watcher;

pub use config::PlayerConfig;
pub use connection::ConnectionManager;
pub use controller::{Player, PlayerBuilder};
pub use daemon::{DaemonClient, DaemonProcess, DaemonStatus, DaemonWatch, Dialer, MpdDialer};
pub use error::{PlayerError, Result};
pub use model::{PlaybackState, SongId, SongKind, Track};
pub use timer::{Timer, TimerOptions};
pub use watcher::{Subsystem, SwitchDebounce};

// Re-export the wire-level error so trait implementors need no extra dependency
pub use mpd_client::MpdError;
