//! Error types for the MPD client

use thiserror::Error;

/// Errors that can occur while talking to an MPD server
#[derive(Debug, Error)]
pub enum MpdError {
    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent something that is not valid protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server rejected a command
    #[error("ACK [{code}@{index}] {{{command}}} {message}")]
    Ack {
        code: u16,
        index: u32,
        command: String,
        message: String,
    },

    /// Only `tcp` and `unix` networks are understood
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// The server closed the connection
    #[error("Connection closed by server")]
    Closed,
}

impl MpdError {
    /// Parse an `ACK [code@index] {command} message` line
    pub(crate) fn from_ack_line(line: &str) -> Self {
        let parsed = (|| {
            let rest = line.strip_prefix("ACK [")?;
            let (location, rest) = rest.split_once(']')?;
            let (code, index) = location.split_once('@')?;
            let rest = rest.trim_start().strip_prefix('{')?;
            let (command, message) = rest.split_once('}')?;
            Some(MpdError::Ack {
                code: code.parse().ok()?,
                index: index.parse().ok()?,
                command: command.to_string(),
                message: message.trim().to_string(),
            })
        })();

        parsed.unwrap_or_else(|| MpdError::Protocol(format!("Malformed ACK line: {}", line)))
    }
}
