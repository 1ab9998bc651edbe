//! Seams to the external daemon
//!
//! The controller never talks to `mpd_client` directly. It goes through the
//! [`Dialer`] and [`DaemonClient`] traits so the daemon can be replaced by an
//! in-process fake in tests. [`MpdDialer`] is the production implementation.
//!
//! [`DaemonProcess`] covers the other collaborator: launching and killing
//! the daemon executable.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use crossbeam::channel::Receiver;
use mpd_client::{Client, MpdError, SongId, Status, Watcher};

use crate::watcher::Subsystem;
use crate::{PlayerConfig, PlayerError, Result};

/// Snapshot of the daemon's transport status, as reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    /// "play", "pause" or "stop"
    pub state: String,
    /// Elapsed seconds, e.g. "12.345"
    pub elapsed: String,
    /// Mixer volume, e.g. "50"
    pub volume: String,
}

impl From<Status> for DaemonStatus {
    fn from(status: Status) -> Self {
        Self {
            state: status.state().to_string(),
            elapsed: status.elapsed().to_string(),
            volume: status.volume().to_string(),
        }
    }
}

/// Command connection to the daemon
pub trait DaemonClient: Send {
    fn ping(&mut self) -> std::result::Result<(), MpdError>;
    fn status(&mut self) -> std::result::Result<DaemonStatus, MpdError>;
    fn add_id(&mut self, locator: &str, position: Option<u32>) -> std::result::Result<SongId, MpdError>;
    fn delete_id(&mut self, id: SongId) -> std::result::Result<(), MpdError>;
    fn play_id(&mut self, id: SongId) -> std::result::Result<(), MpdError>;
    fn pause(&mut self, pause: bool) -> std::result::Result<(), MpdError>;
    fn stop(&mut self) -> std::result::Result<(), MpdError>;
    fn set_volume(&mut self, volume: u8) -> std::result::Result<(), MpdError>;
    fn seek_cur(&mut self, position: Duration, relative: bool) -> std::result::Result<(), MpdError>;
    fn single(&mut self, single: bool) -> std::result::Result<(), MpdError>;
    /// Close the connection; the client is unusable afterwards
    fn close(self: Box<Self>) -> std::result::Result<(), MpdError>;
}

/// Subscription to daemon change notifications
pub trait DaemonWatch: Send + Sync {
    /// Names of changed subsystems
    fn events(&self) -> Receiver<String>;
    /// Failures of the subscription; the event stream ends after one
    fn errors(&self) -> Receiver<MpdError>;
    fn close(&self) -> std::result::Result<(), MpdError>;
}

/// Opens connections and subscriptions to the daemon
pub trait Dialer: Send + Sync {
    /// Human readable daemon address, used in errors and logs
    fn address(&self) -> String;
    fn dial(&self) -> std::result::Result<Box<dyn DaemonClient>, MpdError>;
    fn watch(&self, subsystems: &[Subsystem]) -> std::result::Result<Box<dyn DaemonWatch>, MpdError>;
}

impl DaemonClient for Client {
    fn ping(&mut self) -> std::result::Result<(), MpdError> {
        Client::ping(self)
    }

    fn status(&mut self) -> std::result::Result<DaemonStatus, MpdError> {
        Client::status(self).map(DaemonStatus::from)
    }

    fn add_id(&mut self, locator: &str, position: Option<u32>) -> std::result::Result<SongId, MpdError> {
        Client::add_id(self, locator, position)
    }

    fn delete_id(&mut self, id: SongId) -> std::result::Result<(), MpdError> {
        Client::delete_id(self, id)
    }

    fn play_id(&mut self, id: SongId) -> std::result::Result<(), MpdError> {
        Client::play_id(self, id)
    }

    fn pause(&mut self, pause: bool) -> std::result::Result<(), MpdError> {
        Client::pause(self, pause)
    }

    fn stop(&mut self) -> std::result::Result<(), MpdError> {
        Client::stop(self)
    }

    fn set_volume(&mut self, volume: u8) -> std::result::Result<(), MpdError> {
        Client::set_volume(self, volume)
    }

    fn seek_cur(&mut self, position: Duration, relative: bool) -> std::result::Result<(), MpdError> {
        Client::seek_cur(self, position, relative)
    }

    fn single(&mut self, single: bool) -> std::result::Result<(), MpdError> {
        Client::single(self, single)
    }

    fn close(self: Box<Self>) -> std::result::Result<(), MpdError> {
        Client::close(*self)
    }
}

impl DaemonWatch for Watcher {
    fn events(&self) -> Receiver<String> {
        Watcher::events(self)
    }

    fn errors(&self) -> Receiver<MpdError> {
        Watcher::errors(self)
    }

    fn close(&self) -> std::result::Result<(), MpdError> {
        Watcher::close(self)
    }
}

/// [`Dialer`] backed by real MPD connections
#[derive(Debug, Clone)]
pub struct MpdDialer {
    network: String,
    address: String,
}

impl MpdDialer {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.network.clone(), config.address.clone())
    }
}

impl Dialer for MpdDialer {
    fn address(&self) -> String {
        format!("{}:{}", self.network, self.address)
    }

    fn dial(&self) -> std::result::Result<Box<dyn DaemonClient>, MpdError> {
        Ok(Box::new(Client::dial(&self.network, &self.address)?))
    }

    fn watch(&self, subsystems: &[Subsystem]) -> std::result::Result<Box<dyn DaemonWatch>, MpdError> {
        let names: Vec<&str> = subsystems.iter().map(|s| s.as_str()).collect();
        Ok(Box::new(Watcher::new(&self.network, &self.address, None, &names)?))
    }
}

/// The daemon executable
///
/// Launching it with the configuration file daemonizes it; launching it
/// again with `--kill` terminates the running instance.
#[derive(Debug, Clone)]
pub struct DaemonProcess {
    bin: String,
    config_file: Option<PathBuf>,
}

impl DaemonProcess {
    pub fn new(bin: impl Into<String>, config_file: Option<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            config_file,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.bin.clone(), config.config_file.clone())
    }

    /// Start the daemon and wait for it to detach
    pub fn spawn(&self) -> Result<()> {
        tracing::info!("Starting daemon {}", self.bin);
        let output = self.command().output().map_err(|e| PlayerError::DaemonSpawn {
            bin: self.bin.clone(),
            output: e.to_string(),
        })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(PlayerError::DaemonSpawn {
                bin: self.bin.clone(),
                output: format!("{}: {}", output.status, combined.trim()),
            });
        }

        Ok(())
    }

    /// Ask the running daemon to exit; failures are only logged
    pub fn terminate(&self) {
        tracing::info!("Terminating daemon {}", self.bin);
        match self.command().arg("--kill").output() {
            Ok(output) if !output.status.success() => {
                tracing::warn!("Daemon kill exited with {}", output.status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to run daemon kill: {}", e),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.bin);
        if let Some(config_file) = &self.config_file {
            command.arg(config_file);
        }
        command
    }
}
