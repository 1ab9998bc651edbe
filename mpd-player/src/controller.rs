//! Playback state controller
//!
//! [`Player`] keeps a local view of what the daemon is playing. It drives
//! the daemon through the shared [`ConnectionManager`], simulates the
//! playback position with a per-track [`Timer`], and pulls ground truth back
//! from the daemon whenever the daemon reports a change.
//!
//! Two background threads run for the lifetime of a player:
//! - the command loop, which performs track switches requested by [`Player::play`]
//! - the watch loop, which reconciles state on daemon notifications
//!
//! Every state-mutating operation runs under a single command lock. Field
//! reads only take a short data lock and never wait for the daemon.
//!
//! Observation channels ([`Player::time_updates`], [`Player::state_updates`])
//! are zero-capacity and every send is a `try_send`: an observer that is not
//! blocked in `recv` at the time simply misses that update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use mpd_client::MpdError;
use parking_lot::Mutex;

use crate::connection::ConnectionManager;
use crate::daemon::{DaemonClient, DaemonProcess, DaemonWatch};
use crate::model::{clamp_volume, PlaybackState, SongId, SongKind, Track, VOLUME_STEP};
use crate::timer::{Timer, TimerOptions};
use crate::watcher::{spawn_watch_loop, Subsystem, SwitchDebounce};
use crate::{PlayerConfig, PlayerError, Result};

/// Position new songs are inserted at in the daemon queue
const QUEUE_POSITION: u32 = 0;

#[derive(Debug, Default)]
struct Data {
    state: PlaybackState,
    track: Option<Track>,
    song_id: Option<SongId>,
    timer: Option<Arc<Timer>>,
    volume: u8,
}

/// State shared between the public handle and the background loops
struct Inner {
    connection: Arc<ConnectionManager>,
    timer_options: TimerOptions,
    /// Serializes every state-mutating operation
    commands: Mutex<()>,
    data: Mutex<Data>,
    debounce: Arc<SwitchDebounce>,
    time_tx: Sender<Duration>,
    state_tx: Sender<PlaybackState>,
}

impl Inner {
    fn daemon<T>(
        &self,
        command: &'static str,
        f: impl FnOnce(&mut dyn DaemonClient) -> std::result::Result<T, MpdError>,
    ) -> Result<T> {
        self.connection
            .with_client(|client| f(client).map_err(PlayerError::command(command)))
    }

    fn state(&self) -> PlaybackState {
        self.data.lock().state
    }

    fn timer(&self) -> Option<Arc<Timer>> {
        self.data.lock().timer.clone()
    }

    fn set_state(&self, state: PlaybackState) {
        self.data.lock().state = state;
        let _ = self.state_tx.try_send(state);
    }

    // ========================================================================
    // Transport commands, caller holds the command lock
    // ========================================================================

    fn pause_locked(&self) -> Result<()> {
        if self.state() != PlaybackState::Playing {
            return Ok(());
        }
        self.daemon("pause", |c| c.pause(true))?;
        if let Some(timer) = self.timer() {
            timer.pause();
        }
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    fn resume_locked(&self) -> Result<()> {
        if self.state() == PlaybackState::Playing {
            return Ok(());
        }
        self.daemon("pause", |c| c.pause(false))?;
        if let Some(timer) = self.timer() {
            timer.start();
        }
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    fn stop_locked(&self) -> Result<()> {
        if self.state() == PlaybackState::Stopped {
            return Ok(());
        }
        // The daemon is only paused; "stopped" is a local label
        self.daemon("pause", |c| c.pause(true))?;
        if let Some(timer) = self.timer() {
            timer.pause();
        }
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    fn switch_track_locked(&self, track: Track) -> Result<()> {
        tracing::info!("Switching to {} ({:?})", track.locator, track.kind);

        self.debounce.mark_switch();
        self.pause_locked()?;

        let (old_timer, old_song) = {
            let mut data = self.data.lock();
            data.track = Some(track.clone());
            (data.timer.take(), data.song_id.take())
        };
        if let Some(timer) = old_timer {
            timer.stop();
        }
        if let Some(id) = old_song {
            if let Err(e) = self.daemon("deleteid", |c| c.delete_id(id)) {
                tracing::warn!("Failed to remove previous song {}: {}", id, e);
            }
        }

        let id = self.daemon("addid", |c| c.add_id(&track.locator, Some(QUEUE_POSITION)))?;
        let time_tx = self.time_tx.clone();
        let timer = Arc::new(Timer::new(self.timer_options, move |elapsed| {
            let _ = time_tx.try_send(elapsed);
        }));
        {
            let mut data = self.data.lock();
            data.song_id = Some(id);
            data.timer = Some(timer);
        }

        self.daemon("playid", |c| c.play_id(id))?;
        self.resume_locked()
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    fn sync_status(&self) {
        let _guard = self.commands.lock();

        let status = match self.daemon("status", |c| c.status()) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Failed to fetch daemon status: {}", e);
                return;
            }
        };
        tracing::debug!(
            "Daemon status: state={} elapsed={} volume={}",
            status.state,
            status.elapsed,
            status.volume
        );

        if let Ok(volume) = status.volume.parse::<i32>() {
            // -1 means the daemon has no mixer
            if volume >= 0 {
                self.data.lock().volume = clamp_volume(volume);
            }
        }

        let state = match PlaybackState::from_daemon_state(&status.state) {
            Some(state) => {
                self.set_state(state);
                state
            }
            None => {
                tracing::debug!("Unknown daemon state '{}', keeping local state", status.state);
                self.state()
            }
        };

        let Some(timer) = self.timer() else {
            return;
        };
        let elapsed = status
            .elapsed
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        if !state.is_playing() {
            timer.pause();
        }
        if let Some(elapsed) = elapsed {
            timer.set_elapsed(elapsed);
        }
        if state.is_playing() {
            timer.start();
        }
        let _ = self.time_tx.try_send(timer.elapsed());
    }
}

/// A track switch handed to the command loop
struct PlayRequest {
    track: Track,
    /// Signalled once the loop holds the command lock
    accepted: Sender<()>,
}

/// Playback controller synchronized with an external daemon
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use mpd_player::{ConnectionManager, MpdDialer, Player, PlayerConfig, SongKind};
///
/// let config = PlayerConfig::from_env()?;
/// let connection = Arc::new(ConnectionManager::new(Arc::new(MpdDialer::from_config(&config))));
/// let player = Player::builder().config(config).build(connection)?;
///
/// player.play(SongKind::Url, "http://example.com/stream.mp3", Duration::from_secs(180));
/// for elapsed in player.time_updates().iter().take(5) {
///     println!("{:?}", elapsed);
/// }
/// player.close();
/// ```
pub struct Player {
    inner: Arc<Inner>,
    play_tx: Sender<PlayRequest>,
    close_tx: Mutex<Option<Sender<()>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    watch: Mutex<Option<Box<dyn DaemonWatch>>>,
    daemon: Option<DaemonProcess>,
    time_rx: Receiver<Duration>,
    state_rx: Receiver<PlaybackState>,
    fault_rx: Receiver<PlayerError>,
    closed: AtomicBool,
}

impl Player {
    /// Create a Player builder
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::default()
    }

    /// Request a new track
    ///
    /// The request is handed to the command loop without queueing. Returns
    /// `false` when the loop is busy with a previous switch (or gone), in
    /// which case the request is dropped.
    ///
    /// An accepted request returns once the command loop owns the command
    /// lock, so any command issued afterwards runs after the switch.
    pub fn play(&self, kind: SongKind, locator: impl Into<String>, duration: Duration) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let (accepted_tx, accepted_rx) = channel::bounded(1);
        let request = PlayRequest {
            track: Track::new(kind, locator, duration),
            accepted: accepted_tx,
        };
        if self.play_tx.try_send(request).is_err() {
            return false;
        }
        let _ = accepted_rx.recv();
        true
    }

    pub fn pause(&self) -> Result<()> {
        let _guard = self.inner.commands.lock();
        self.inner.pause_locked()
    }

    pub fn resume(&self) -> Result<()> {
        let _guard = self.inner.commands.lock();
        self.inner.resume_locked()
    }

    /// Stop playback
    ///
    /// The daemon is paused rather than stopped so the track can be resumed.
    pub fn stop(&self) -> Result<()> {
        let _guard = self.inner.commands.lock();
        self.inner.stop_locked()
    }

    /// Pause when playing, resume otherwise
    pub fn toggle(&self) -> Result<()> {
        let _guard = self.inner.commands.lock();
        match self.inner.state() {
            PlaybackState::Paused | PlaybackState::Stopped => self.inner.resume_locked(),
            PlaybackState::Playing => self.inner.pause_locked(),
        }
    }

    /// Seek to an absolute position in the current track
    pub fn seek(&self, position: Duration) -> Result<()> {
        let _guard = self.inner.commands.lock();
        self.inner.daemon("seekcur", |c| c.seek_cur(position, false))?;
        if let Some(timer) = self.inner.timer() {
            timer.set_elapsed(position);
        }
        Ok(())
    }

    pub fn volume_up(&self) {
        self.change_volume(VOLUME_STEP);
    }

    pub fn volume_down(&self) {
        self.change_volume(-VOLUME_STEP);
    }

    /// Set an absolute volume, clamped to `0..=100`
    pub fn set_volume(&self, volume: i32) {
        let _guard = self.inner.commands.lock();
        self.push_volume(clamp_volume(volume));
    }

    fn change_volume(&self, delta: i32) {
        let _guard = self.inner.commands.lock();
        let current = i32::from(self.inner.data.lock().volume);
        self.push_volume(clamp_volume(current + delta));
    }

    fn push_volume(&self, volume: u8) {
        self.inner.data.lock().volume = volume;
        if let Err(e) = self.inner.daemon("setvol", |c| c.set_volume(volume)) {
            tracing::warn!("Failed to set daemon volume to {}: {}", volume, e);
        }
    }

    /// Pull status from the daemon and overwrite transport state
    ///
    /// Track identity is never touched. Failures are logged and ignored.
    pub fn sync_status(&self) {
        self.inner.sync_status();
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.state()
    }

    /// Track of the most recent accepted `play`, if any
    pub fn current_track(&self) -> Option<Track> {
        self.inner.data.lock().track.clone()
    }

    /// Daemon queue id of the current track
    pub fn current_song_id(&self) -> Option<SongId> {
        self.inner.data.lock().song_id
    }

    /// Elapsed time of the current track
    pub fn elapsed(&self) -> Duration {
        self.inner
            .timer()
            .map(|timer| timer.elapsed())
            .unwrap_or_default()
    }

    pub fn volume(&self) -> u8 {
        self.inner.data.lock().volume
    }

    /// Elapsed time updates, delivered only to a waiting receiver
    pub fn time_updates(&self) -> Receiver<Duration> {
        self.time_rx.clone()
    }

    /// State changes, delivered only to a waiting receiver
    pub fn state_updates(&self) -> Receiver<PlaybackState> {
        self.state_rx.clone()
    }

    /// Fatal errors raised by the background loops
    ///
    /// A failed track switch stops the command loop, and a failed daemon
    /// subscription stops the watch loop. Either way the owner is expected
    /// to shut the player down.
    pub fn faults(&self) -> Receiver<PlayerError> {
        self.fault_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut down the player and the daemon
    ///
    /// Must not race with other commands. Calling it again is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Closing player");

        // An accepted switch completes before the command loop joins
        self.stop_loops();
        if let Some(timer) = self.inner.timer() {
            timer.stop();
        }

        if let Some(watch) = self.watch.lock().take() {
            if let Err(e) = watch.close() {
                tracing::warn!("Failed to close daemon watcher: {}", e);
            }
        }
        self.inner.connection.close();

        if let Some(daemon) = &self.daemon {
            daemon.terminate();
        }
    }

    fn stop_loops(&self) {
        // Dropping the sender wakes both loops
        self.close_tx.lock().take();
        let handles: Vec<_> = self.loops.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Player loop panicked");
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            self.stop_loops();
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("track", &self.current_track())
            .field("elapsed", &self.elapsed())
            .field("volume", &self.volume())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// PlayerBuilder
// ============================================================================

/// Builder for Player configuration
#[derive(Debug, Default)]
pub struct PlayerBuilder {
    config: PlayerConfig,
    daemon: Option<DaemonProcess>,
}

impl PlayerBuilder {
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Launch this daemon during `build` and kill it on `close`
    pub fn daemon_process(mut self, daemon: DaemonProcess) -> Self {
        self.daemon = Some(daemon);
        self
    }

    /// Build the Player
    ///
    /// This will:
    /// 1. Start the daemon process, if one was given
    /// 2. Reset the daemon (stop, single mode) on a best-effort basis
    /// 3. Subscribe to player and mixer notifications
    /// 4. Spawn the command and watch loops
    /// 5. Reconcile local state with the daemon once
    pub fn build(self, connection: Arc<ConnectionManager>) -> Result<Player> {
        self.config.validate()?;

        if let Some(daemon) = &self.daemon {
            daemon.spawn()?;
        }

        connection.with_client(|client| {
            if let Err(e) = client.stop() {
                tracing::warn!("Failed to stop daemon on startup: {}", e);
            }
            if let Err(e) = client.single(true) {
                tracing::warn!("Failed to enable single mode: {}", e);
            }
            Ok(())
        })?;

        let watch = connection
            .dialer()
            .watch(&Subsystem::ALL)
            .map_err(PlayerError::Watch)?;

        let (play_tx, play_rx) = channel::bounded::<PlayRequest>(0);
        let (close_tx, close_rx) = channel::bounded::<()>(0);
        let (time_tx, time_rx) = channel::bounded(0);
        let (state_tx, state_rx) = channel::bounded(0);
        let (fault_tx, fault_rx) = channel::bounded(1);

        let debounce = Arc::new(SwitchDebounce::new(self.config.switch_debounce));
        let inner = Arc::new(Inner {
            connection,
            timer_options: TimerOptions {
                duration: self.config.timer_duration,
                tick_interval: self.config.tick_interval,
            },
            commands: Mutex::new(()),
            data: Mutex::new(Data::default()),
            debounce: Arc::clone(&debounce),
            time_tx,
            state_tx,
        });

        let command_loop = spawn_command_loop(
            Arc::clone(&inner),
            play_rx,
            close_rx.clone(),
            fault_tx.clone(),
        )
        .map_err(|source| PlayerError::Spawn {
            name: "command",
            source,
        })?;

        let watch_inner = Arc::clone(&inner);
        let watch_loop = spawn_watch_loop(
            watch.events(),
            watch.errors(),
            close_rx,
            debounce,
            move |_| watch_inner.sync_status(),
            move |fault| {
                let _ = fault_tx.try_send(fault);
            },
        )
        .map_err(|source| PlayerError::Spawn {
            name: "watch",
            source,
        })?;

        let player = Player {
            inner,
            play_tx,
            close_tx: Mutex::new(Some(close_tx)),
            loops: Mutex::new(vec![command_loop, watch_loop]),
            watch: Mutex::new(Some(watch)),
            daemon: self.daemon,
            time_rx,
            state_rx,
            fault_rx,
            closed: AtomicBool::new(false),
        };

        player.sync_status();
        tracing::info!(
            "Player ready: state={} volume={}",
            player.state(),
            player.volume()
        );
        Ok(player)
    }
}

fn spawn_command_loop(
    inner: Arc<Inner>,
    play_rx: Receiver<PlayRequest>,
    close_rx: Receiver<()>,
    fault_tx: Sender<PlayerError>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("player-commands".to_string())
        .spawn(move || {
            tracing::debug!("Command loop started");
            loop {
                let request = select! {
                    recv(close_rx) -> _ => None,
                    recv(play_rx) -> request => request.ok(),
                };
                let Some(PlayRequest { track, accepted }) = request else {
                    break;
                };

                let _guard = inner.commands.lock();
                let _ = accepted.send(());
                if let Err(e) = inner.switch_track_locked(track) {
                    tracing::error!("Track switch failed: {}", e);
                    let _ = fault_tx.try_send(e);
                    break;
                }
            }
            tracing::debug!("Command loop stopped");
        })
}
