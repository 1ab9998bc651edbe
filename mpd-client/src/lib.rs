//! Private MPD client for daemon communication
//!
//! This crate provides a minimal blocking client for the Music Player Daemon
//! line protocol. It covers exactly the commands the player needs: status
//! queries, queue manipulation by song id, transport control, volume and
//! seeking. It also supports change notifications through the `idle`
//! command, see [`Watcher`].

mod error;
mod stream;
mod watcher;

pub use error::MpdError;
pub use watcher::Watcher;

use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use stream::Stream;

/// Result type for MPD operations
pub type Result<T> = std::result::Result<T, MpdError>;

/// Read timeout applied to command connections
const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifier MPD assigns to a song once it is added to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SongId(pub u32);

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Response of the `status` command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    fields: HashMap<String, String>,
}

impl Status {
    /// Raw field lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Playback mode: `play`, `pause` or `stop`
    pub fn state(&self) -> &str {
        self.get("state").unwrap_or("stop")
    }

    /// Elapsed seconds of the current song as sent by the server, e.g. `"12.345"`
    pub fn elapsed(&self) -> &str {
        self.get("elapsed").unwrap_or("0")
    }

    /// Mixer volume as sent by the server; `-1` when there is no mixer
    pub fn volume(&self) -> &str {
        self.get("volume").unwrap_or("-1")
    }
}

impl FromIterator<(String, String)> for Status {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A blocking connection to an MPD server
#[derive(Debug)]
pub struct Client {
    reader: BufReader<Stream>,
    writer: Stream,
    version: String,
}

impl Client {
    /// Connect to a server
    ///
    /// # Arguments
    /// * `network` - `"tcp"` or `"unix"`
    /// * `address` - `host:port` for tcp, socket path for unix
    pub fn dial(network: &str, address: &str) -> Result<Self> {
        let stream = Stream::connect(network, address)?;
        stream.set_read_timeout(Some(COMMAND_READ_TIMEOUT))?;
        Self::from_stream(stream)
    }

    /// Connect without a read timeout, for connections that block in `idle`
    pub(crate) fn dial_idle(network: &str, address: &str) -> Result<Self> {
        Self::from_stream(Stream::connect(network, address)?)
    }

    fn from_stream(stream: Stream) -> Result<Self> {
        let writer = stream.try_clone()?;
        let mut client = Self {
            reader: BufReader::new(stream),
            writer,
            version: String::new(),
        };

        let greeting = client.read_line()?;
        client.version = greeting
            .strip_prefix("OK MPD ")
            .ok_or_else(|| MpdError::Protocol(format!("Unexpected greeting: {}", greeting)))?
            .to_string();

        tracing::debug!("Connected to MPD {}", client.version);
        Ok(client)
    }

    /// Protocol version announced in the greeting
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Authenticate with a password
    pub fn password(&mut self, password: &str) -> Result<()> {
        self.run(&format!("password {}", quote(password))).map(|_| ())
    }

    /// Liveness check
    pub fn ping(&mut self) -> Result<()> {
        self.run("ping").map(|_| ())
    }

    /// Fetch the current player status
    pub fn status(&mut self) -> Result<Status> {
        Ok(self.run("status")?.into_iter().collect())
    }

    /// Add a song to the queue and return its id
    ///
    /// When `position` is given the song is inserted there, otherwise it is
    /// appended.
    pub fn add_id(&mut self, uri: &str, position: Option<u32>) -> Result<SongId> {
        let command = match position {
            Some(pos) => format!("addid {} {}", quote(uri), pos),
            None => format!("addid {}", quote(uri)),
        };

        self.run(&command)?
            .into_iter()
            .find(|(key, _)| key == "Id")
            .and_then(|(_, value)| value.parse().ok())
            .map(SongId)
            .ok_or_else(|| MpdError::Protocol("Missing Id in addid response".to_string()))
    }

    /// Remove a song from the queue
    pub fn delete_id(&mut self, id: SongId) -> Result<()> {
        self.run(&format!("deleteid {}", id)).map(|_| ())
    }

    /// Start playing the song with the given id
    pub fn play_id(&mut self, id: SongId) -> Result<()> {
        self.run(&format!("playid {}", id)).map(|_| ())
    }

    /// Pause (`true`) or resume (`false`) playback
    pub fn pause(&mut self, pause: bool) -> Result<()> {
        self.run(if pause { "pause 1" } else { "pause 0" }).map(|_| ())
    }

    /// Stop playback
    pub fn stop(&mut self) -> Result<()> {
        self.run("stop").map(|_| ())
    }

    /// Set the mixer volume, 0 to 100
    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.run(&format!("setvol {}", volume.min(100))).map(|_| ())
    }

    /// Seek within the current song
    pub fn seek_cur(&mut self, position: Duration, relative: bool) -> Result<()> {
        let sign = if relative { "+" } else { "" };
        self.run(&format!("seekcur {}{:.3}", sign, position.as_secs_f64()))
            .map(|_| ())
    }

    /// Toggle single mode
    pub fn single(&mut self, single: bool) -> Result<()> {
        self.run(if single { "single 1" } else { "single 0" }).map(|_| ())
    }

    /// Block until one of the given subsystems changes
    ///
    /// Returns the names of the subsystems that changed. An empty list means
    /// the wait was cancelled with `noidle`.
    pub fn idle(&mut self, subsystems: &[&str]) -> Result<Vec<String>> {
        let mut command = String::from("idle");
        for subsystem in subsystems {
            command.push(' ');
            command.push_str(subsystem);
        }

        Ok(self
            .run(&command)?
            .into_iter()
            .filter(|(key, _)| key == "changed")
            .map(|(_, value)| value)
            .collect())
    }

    /// Politely close the connection
    pub fn close(mut self) -> Result<()> {
        let _ = self.writer.write_all(b"close\n");
        self.writer.shutdown()?;
        Ok(())
    }

    pub(crate) fn shutdown_handle(&self) -> Result<Stream> {
        Ok(self.writer.try_clone()?)
    }

    /// Send one command line and collect the `key: value` pairs of its response
    fn run(&mut self, command: &str) -> Result<Vec<(String, String)>> {
        tracing::trace!("mpd > {}", command);
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut pairs = Vec::new();
        loop {
            let line = self.read_line()?;
            if line == "OK" {
                return Ok(pairs);
            }
            if line.starts_with("ACK ") {
                return Err(MpdError::from_ack_line(&line));
            }

            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| MpdError::Protocol(format!("Unexpected line: {}", line)))?;
            pairs.push((key.to_string(), value.to_string()));
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(MpdError::Closed);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!("mpd < {}", line);
        Ok(line)
    }
}

/// Quote a command argument, escaping backslashes and double quotes
fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
