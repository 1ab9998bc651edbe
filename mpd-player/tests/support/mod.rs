//! Mock daemon for testing.
//!
//! `MockDaemon` implements the `Dialer`, `DaemonClient` and `DaemonWatch`
//! seams without any sockets. It records every command (except `ping`),
//! keeps a status that reacts to transport commands the way the real daemon
//! does, lets tests inject change notifications, and can be told to fail
//! specific commands.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use mpd_player::{
    ConnectionManager, DaemonClient, DaemonStatus, DaemonWatch, Dialer, MpdError, Player,
    PlayerConfig, SongId, SongKind, Subsystem,
};

#[derive(Debug)]
struct MockState {
    commands: Vec<String>,
    status: DaemonStatus,
    next_id: u32,
    failing: HashSet<&'static str>,
    fail_dial: bool,
    dials: usize,
}

/// In-process stand-in for the daemon
#[derive(Clone)]
pub struct MockDaemon {
    state: Arc<Mutex<MockState>>,
    events_tx: Sender<String>,
    events_rx: Receiver<String>,
    errors_tx: Sender<MpdError>,
    errors_rx: Receiver<MpdError>,
    watch_closed: Arc<AtomicBool>,
    watches: Arc<AtomicUsize>,
}

impl MockDaemon {
    /// A daemon reporting the given initial status
    pub fn new(state: &str, elapsed: &str, volume: &str) -> Self {
        let (events_tx, events_rx) = channel::unbounded();
        let (errors_tx, errors_rx) = channel::unbounded();
        Self {
            state: Arc::new(Mutex::new(MockState {
                commands: Vec::new(),
                status: DaemonStatus {
                    state: state.to_string(),
                    elapsed: elapsed.to_string(),
                    volume: volume.to_string(),
                },
                next_id: 1,
                failing: HashSet::new(),
                fail_dial: false,
                dials: 0,
            })),
            events_tx,
            events_rx,
            errors_tx,
            errors_rx,
            watch_closed: Arc::new(AtomicBool::new(false)),
            watches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A freshly started daemon: stopped, at volume 50
    pub fn fresh() -> Self {
        Self::new("stop", "0", "50")
    }

    /// Every recorded command line, in order
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Recorded commands starting with `prefix`
    pub fn commands_matching(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    /// Change what the daemon reports, as if another client acted on it
    pub fn set_status(&self, state: &str, elapsed: &str, volume: &str) {
        self.state.lock().unwrap().status = DaemonStatus {
            state: state.to_string(),
            elapsed: elapsed.to_string(),
            volume: volume.to_string(),
        };
    }

    pub fn status(&self) -> DaemonStatus {
        self.state.lock().unwrap().status.clone()
    }

    /// Make every subsequent call of `command` fail
    pub fn fail(&self, command: &'static str) {
        self.state.lock().unwrap().failing.insert(command);
    }

    pub fn fail_dial(&self, fail: bool) {
        self.state.lock().unwrap().fail_dial = fail;
    }

    pub fn dials(&self) -> usize {
        self.state.lock().unwrap().dials
    }

    /// Deliver a change notification
    pub fn notify(&self, subsystem: Subsystem) {
        self.events_tx.send(subsystem.as_str().to_string()).unwrap();
    }

    /// Fail the notification subscription with `error`
    pub fn break_watch(&self, error: MpdError) {
        self.errors_tx.send(error).unwrap();
    }

    pub fn watch_closed(&self) -> bool {
        self.watch_closed.load(Ordering::SeqCst)
    }

    pub fn watches(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    /// Record a command and apply its effect on the status
    fn apply(&self, command: &'static str, line: String) -> Result<(), MpdError> {
        let mut state = self.state.lock().unwrap();
        if command != "ping" {
            state.commands.push(line.clone());
        }
        if state.failing.contains(command) {
            return Err(MpdError::Ack {
                code: 5,
                index: 0,
                command: command.to_string(),
                message: "mock failure".to_string(),
            });
        }

        let status = &mut state.status;
        match command {
            "pause" if line.ends_with('1') && status.state != "stop" => {
                status.state = "pause".to_string();
            }
            "pause" if line.ends_with('0') && status.state == "pause" => {
                status.state = "play".to_string();
            }
            "playid" => {
                status.state = "play".to_string();
                status.elapsed = "0".to_string();
            }
            "stop" => status.state = "stop".to_string(),
            "setvol" => {
                if let Some(volume) = line.split_whitespace().nth(1) {
                    status.volume = volume.to_string();
                }
            }
            "seekcur" => {
                if let Some(position) = line.split_whitespace().nth(1) {
                    status.elapsed = position.to_string();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

struct MockClient(MockDaemon);

impl DaemonClient for MockClient {
    fn ping(&mut self) -> Result<(), MpdError> {
        self.0.apply("ping", "ping".to_string())
    }

    fn status(&mut self) -> Result<DaemonStatus, MpdError> {
        self.0.apply("status", "status".to_string())?;
        Ok(self.0.status())
    }

    fn add_id(&mut self, locator: &str, position: Option<u32>) -> Result<SongId, MpdError> {
        let line = match position {
            Some(pos) => format!("addid {} {}", locator, pos),
            None => format!("addid {}", locator),
        };
        self.0.apply("addid", line)?;
        let mut state = self.0.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        Ok(SongId(id))
    }

    fn delete_id(&mut self, id: SongId) -> Result<(), MpdError> {
        self.0.apply("deleteid", format!("deleteid {}", id))
    }

    fn play_id(&mut self, id: SongId) -> Result<(), MpdError> {
        self.0.apply("playid", format!("playid {}", id))
    }

    fn pause(&mut self, pause: bool) -> Result<(), MpdError> {
        self.0.apply("pause", format!("pause {}", u8::from(pause)))
    }

    fn stop(&mut self) -> Result<(), MpdError> {
        self.0.apply("stop", "stop".to_string())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), MpdError> {
        self.0.apply("setvol", format!("setvol {}", volume))
    }

    fn seek_cur(&mut self, position: Duration, relative: bool) -> Result<(), MpdError> {
        let sign = if relative { "+" } else { "" };
        self.0
            .apply("seekcur", format!("seekcur {}{:.3}", sign, position.as_secs_f64()))
    }

    fn single(&mut self, single: bool) -> Result<(), MpdError> {
        self.0.apply("single", format!("single {}", u8::from(single)))
    }

    fn close(self: Box<Self>) -> Result<(), MpdError> {
        self.0.apply("close", "close".to_string())
    }
}

struct MockWatch {
    events: Receiver<String>,
    errors: Receiver<MpdError>,
    closed: Arc<AtomicBool>,
}

impl DaemonWatch for MockWatch {
    fn events(&self) -> Receiver<String> {
        self.events.clone()
    }

    fn errors(&self) -> Receiver<MpdError> {
        self.errors.clone()
    }

    fn close(&self) -> Result<(), MpdError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Dialer for MockDaemon {
    fn address(&self) -> String {
        "mock:6600".to_string()
    }

    fn dial(&self) -> Result<Box<dyn DaemonClient>, MpdError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_dial {
            return Err(MpdError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock daemon is down",
            )));
        }
        state.dials += 1;
        Ok(Box::new(MockClient(self.clone())))
    }

    fn watch(&self, subsystems: &[Subsystem]) -> Result<Box<dyn DaemonWatch>, MpdError> {
        assert_eq!(subsystems, &[Subsystem::Player, Subsystem::Mixer]);
        self.watches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockWatch {
            events: self.events_rx.clone(),
            errors: self.errors_rx.clone(),
            closed: Arc::clone(&self.watch_closed),
        }))
    }
}

/// Configuration with a fast tick for tests
pub fn test_config() -> PlayerConfig {
    PlayerConfig::default().with_tick_interval(Duration::from_millis(10))
}

/// Build a player against the mock
pub fn start_player(daemon: &MockDaemon, config: PlayerConfig) -> Player {
    let connection = Arc::new(ConnectionManager::new(Arc::new(daemon.clone())));
    Player::builder()
        .config(config)
        .build(connection)
        .expect("Failed to build player")
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Issue `play` until the command loop accepts it, then wait for the switch
pub fn play_and_wait(player: &Player, locator: &str, duration: Duration) {
    let accepted = wait_until(Duration::from_secs(2), || {
        player.play(SongKind::Url, locator, duration)
    });
    assert!(accepted, "play request was never accepted");

    let switched = wait_until(Duration::from_secs(2), || {
        player.state().is_playing()
            && player
                .current_track()
                .map(|t| t.locator == locator)
                .unwrap_or(false)
            && player.current_song_id().is_some()
    });
    assert!(switched, "player never started playing {}", locator);
}
