use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use mpd_player::logging::{init_logging_with_filter, LoggingMode};
use mpd_player::{
    ConnectionManager, DaemonProcess, MpdDialer, PlaybackState, Player, PlayerConfig, PlayerError,
    SongKind,
};

/// Interactive MPD playback controller
///
/// Reads one command per line from stdin and drives the daemon through the
/// player. Any daemon fault that leaves the player without a usable link
/// terminates the process with a non-zero status.
#[derive(Parser, Debug)]
#[command(name = "mpd-player")]
#[command(about = "Drive an MPD daemon from the terminal")]
#[command(version)]
pub struct Args {
    /// Daemon executable
    #[arg(long)]
    pub bin: Option<String>,

    /// Daemon configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Network for daemon connections (tcp, tcp4, tcp6, unix)
    #[arg(long)]
    pub network: Option<String>,

    /// Daemon address, host:port or socket path
    #[arg(short, long)]
    pub address: Option<String>,

    /// Tick interval of the elapsed time display in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Connect to an already running daemon instead of launching one
    #[arg(long)]
    pub no_spawn: bool,

    /// Log output (silent, development, debug)
    #[arg(long, default_value = "development")]
    pub log_mode: LoggingMode,

    /// Log filter, e.g. "debug" or "mpd_player=trace"
    ///
    /// Overrides MPD_PLAYER_LOG_LEVEL and RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Environment configuration with command line overrides applied
    pub fn player_config(&self) -> Result<PlayerConfig> {
        let mut config =
            PlayerConfig::from_env().context("Invalid player environment configuration")?;

        if let Some(bin) = &self.bin {
            config.bin = bin.clone();
        }
        if let Some(path) = &self.config {
            config.config_file = Some(path.clone());
        }
        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(tick) = self.tick_ms {
            config.tick_interval = Duration::from_millis(tick);
        }

        config.validate().context("Invalid player configuration")?;
        Ok(config)
    }
}

fn print_help() {
    println!("Commands:");
    println!("  play <uri> [seconds] [mp3|flac|url]  Switch to a new track");
    println!("  pause | resume | stop | toggle       Transport control");
    println!("  seek <seconds>                       Jump to a position");
    println!("  up | down | vol <0-100>              Volume");
    println!("  status                               Show the current state");
    println!("  sync                                 Reconcile with the daemon");
    println!("  help | quit");
}

/// A parsed input line
#[derive(Debug, PartialEq)]
enum Command {
    Play {
        locator: String,
        duration: Duration,
        kind: SongKind,
    },
    Pause,
    Resume,
    Stop,
    Toggle,
    Seek(Duration),
    VolumeUp,
    VolumeDown,
    Volume(i32),
    Status,
    Sync,
    Help,
    Quit,
}

fn parse_kind(kind: &str) -> Option<SongKind> {
    match kind.to_lowercase().as_str() {
        "mp3" => Some(SongKind::Mp3),
        "flac" => Some(SongKind::Flac),
        "url" => Some(SongKind::Url),
        _ => None,
    }
}

fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("'{}' is not a number of seconds", value))
}

fn parse_command(line: &str) -> std::result::Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("play", [locator, rest @ ..]) => {
            let duration = match rest.first() {
                Some(secs) => parse_seconds(secs)?,
                None => Duration::ZERO,
            };
            let kind = match rest.get(1) {
                Some(kind) => parse_kind(kind).ok_or_else(|| format!("unknown kind '{}'", kind))?,
                None => SongKind::Url,
            };
            Command::Play {
                locator: locator.to_string(),
                duration,
                kind,
            }
        }
        ("pause", []) => Command::Pause,
        ("resume", []) => Command::Resume,
        ("stop", []) => Command::Stop,
        ("toggle", []) => Command::Toggle,
        ("seek", [secs]) => Command::Seek(parse_seconds(secs)?),
        ("up", []) => Command::VolumeUp,
        ("down", []) => Command::VolumeDown,
        ("vol", [volume]) => Command::Volume(
            volume
                .parse()
                .map_err(|_| format!("'{}' is not a volume", volume))?,
        ),
        ("status", []) => Command::Status,
        ("sync", []) => Command::Sync,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => return Err(format!("unrecognized command '{}'", line.trim())),
    };
    Ok(command)
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn print_status(player: &Player) {
    match player.current_track() {
        Some(track) => println!(
            "{} {} [{} / {}] volume {}",
            player.state(),
            track.locator,
            format_elapsed(player.elapsed()),
            format_elapsed(track.duration),
            player.volume()
        ),
        None => println!("{} (no track) volume {}", player.state(), player.volume()),
    }
}

/// Forward stdin lines until EOF
fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

/// Execute one command, returning false when the session should end
fn execute(player: &Player, command: Command) -> std::result::Result<bool, PlayerError> {
    match command {
        Command::Play {
            locator,
            duration,
            kind,
        } => {
            if !player.play(kind, locator.as_str(), duration) {
                println!("busy switching tracks, '{}' dropped", locator);
            }
        }
        Command::Pause => player.pause()?,
        Command::Resume => player.resume()?,
        Command::Stop => player.stop()?,
        Command::Toggle => player.toggle()?,
        Command::Seek(position) => player.seek(position)?,
        Command::VolumeUp => player.volume_up(),
        Command::VolumeDown => player.volume_down(),
        Command::Volume(volume) => player.set_volume(volume),
        Command::Status => print_status(player),
        Command::Sync => {
            player.sync_status();
            print_status(player);
        }
        Command::Help => print_help(),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

enum Event {
    Fault(PlayerError),
    State(PlaybackState),
    Line(String),
    InputClosed,
    Interrupted,
}

/// Input loop supervising the player
///
/// Returns an error for the first fatal fault, from a command or from the
/// player's background loop.
fn run_session(player: &Player) -> Result<()> {
    let lines = spawn_stdin_reader()?;
    let (interrupt_tx, interrupts) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("Failed to install Ctrl+C handler")?;
    let faults = player.faults();
    let states = player.state_updates();

    loop {
        let event = select! {
            recv(faults) -> fault => fault.ok().map(Event::Fault),
            recv(states) -> state => state.ok().map(Event::State),
            recv(lines) -> line => Some(line.map_or(Event::InputClosed, Event::Line)),
            recv(interrupts) -> _ => Some(Event::Interrupted),
        };

        let line = match event {
            None => continue,
            Some(Event::Fault(fault)) => {
                error!("Player fault: {}", fault);
                return Err(fault).context("Daemon link failed");
            }
            Some(Event::State(state)) => {
                info!("Playback {}", state);
                continue;
            }
            Some(Event::InputClosed) => {
                info!("Input closed");
                return Ok(());
            }
            Some(Event::Interrupted) => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
            Some(Event::Line(line)) => line,
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}; type 'help' for commands", e);
                continue;
            }
        };

        match execute(player, command) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) if e.is_fatal() => {
                error!("Command failed: {}", e);
                return Err(e).context("Daemon link failed");
            }
            Err(e) => println!("{}", e),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging_with_filter(args.log_mode, args.log_level.as_deref())
        .context("Failed to initialize logging")?;

    let config = args.player_config()?;
    info!(
        "Connecting to daemon at {}:{}",
        config.network, config.address
    );

    let dialer = Arc::new(MpdDialer::from_config(&config));
    let connection = Arc::new(ConnectionManager::new(dialer));
    let mut builder = Player::builder();
    if !args.no_spawn {
        builder = builder.daemon_process(DaemonProcess::from_config(&config));
    }
    let player = builder
        .config(config)
        .build(connection)
        .context("Failed to start player")?;

    print_help();
    print_status(&player);

    let result = run_session(&player);
    player.close();
    result
}
