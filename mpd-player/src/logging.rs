//! Logging setup for applications embedding the player
//!
//! The player itself only emits `tracing` events. Applications pick how they
//! are rendered; a terminal UI usually wants [`LoggingMode::Silent`] so the
//! screen is not corrupted by stderr output.

use std::str::FromStr;

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with thread ids and source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Unknown logging mode '{0}' (expected silent, development or debug)")]
    UnknownMode(String),
}

impl FromStr for LoggingMode {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" => Ok(LoggingMode::Silent),
            "development" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            _ => Err(LoggingError::UnknownMode(s.to_string())),
        }
    }
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `MPD_PLAYER_LOG_LEVEL`: filter directive, e.g. `debug` or `mpd_player=trace`
/// - `RUST_LOG`: used when the above is not set
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    init_logging_with_filter(mode, None)
}

/// Initialize logging with an explicit filter directive
///
/// `filter` takes precedence over the environment variables read by
/// [`init_logging`].
pub fn init_logging_with_filter(
    mode: LoggingMode,
    filter: Option<&str>,
) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .with(env_filter(filter, "info"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter(filter, "debug"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
    }
}

/// Initialize logging from `MPD_PLAYER_LOG_MODE`
///
/// Accepts "silent", "development" and "debug"; anything else means silent.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_logging(mode_from_str(
        std::env::var("MPD_PLAYER_LOG_MODE").as_deref().unwrap_or(""),
    ))
}

fn mode_from_str(mode: &str) -> LoggingMode {
    mode.parse().unwrap_or(LoggingMode::Silent)
}

fn env_filter(filter: Option<&str>, default_level: &str) -> EnvFilter {
    if let Some(filter) = filter {
        EnvFilter::new(filter)
    } else if let Ok(level) = std::env::var("MPD_PLAYER_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Whether a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
