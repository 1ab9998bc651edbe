//! Configuration types for the player
//!
//! Defines where the daemon lives, how it is launched, and the timing
//! constants of the local clock and event handling.

use std::path::PathBuf;
use std::time::Duration;

use crate::{PlayerError, Result};

/// Configuration for the [`Player`](crate::Player) and its daemon
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Daemon executable
    /// Default: "mpd"
    pub bin: String,

    /// Daemon configuration file passed as the first argument
    /// Default: none
    pub config_file: Option<PathBuf>,

    /// Network for daemon connections, "tcp" or "unix"
    /// Default: "tcp"
    pub network: String,

    /// Daemon address, `host:port` or a socket path
    /// Default: "localhost:6600"
    pub address: String,

    /// Interval at which elapsed time is published while playing
    /// Default: 200 milliseconds
    pub tick_interval: Duration,

    /// Window after a track switch during which player events are ignored
    /// Default: 2 seconds
    pub switch_debounce: Duration,

    /// Ceiling of the per-track clock
    /// Default: one year
    pub timer_duration: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            bin: "mpd".to_string(),
            config_file: None,
            network: "tcp".to_string(),
            address: "localhost:6600".to_string(),
            tick_interval: Duration::from_millis(200),
            switch_debounce: Duration::from_secs(2),
            timer_duration: Duration::from_secs(8760 * 3600),
        }
    }
}

impl PlayerConfig {
    /// Create a new PlayerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables
    ///
    /// - `MPD_PLAYER_BIN`: daemon executable
    /// - `MPD_PLAYER_CONFIG`: daemon configuration file
    /// - `MPD_PLAYER_NETWORK`: "tcp" or "unix"
    /// - `MPD_PLAYER_ADDRESS`: daemon address
    /// - `MPD_PLAYER_TICK_MS`: tick interval in milliseconds
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(bin) = lookup("MPD_PLAYER_BIN") {
            config.bin = bin;
        }
        if let Some(path) = lookup("MPD_PLAYER_CONFIG") {
            config.config_file = Some(PathBuf::from(path));
        }
        if let Some(network) = lookup("MPD_PLAYER_NETWORK") {
            config.network = network;
        }
        if let Some(address) = lookup("MPD_PLAYER_ADDRESS") {
            config.address = address;
        }
        if let Some(tick) = lookup("MPD_PLAYER_TICK_MS") {
            let millis: u64 = tick.parse().map_err(|_| {
                PlayerError::Config(format!("MPD_PLAYER_TICK_MS is not a number: {}", tick))
            })?;
            config.tick_interval = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the player cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.bin.is_empty() {
            return Err(PlayerError::Config("daemon executable is empty".to_string()));
        }
        if !matches!(self.network.as_str(), "tcp" | "tcp4" | "tcp6" | "unix") {
            return Err(PlayerError::Config(format!(
                "unsupported network '{}'",
                self.network
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(PlayerError::Config("tick interval must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn with_address(mut self, network: impl Into<String>, address: impl Into<String>) -> Self {
        self.network = network.into();
        self.address = address.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_switch_debounce(mut self, window: Duration) -> Self {
        self.switch_debounce = window;
        self
    }

    pub fn with_timer_duration(mut self, duration: Duration) -> Self {
        self.timer_duration = duration;
        self
    }
}
