//! Software playback clock
//!
//! Polling the daemon for the live position on every display refresh is too
//! expensive, so the player keeps its own clock per track. The clock measures
//! wall time with [`Instant`] while running and is frozen while paused. A
//! background thread owned by the [`Timer`] calls the tick callback at a
//! fixed interval while the clock runs.
//!
//! A timer is single use: once [`Timer::stop`] has been called it never runs
//! again. The player creates a new one for every track.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// Callback invoked on every tick with the current elapsed time
pub type TickFn = dyn Fn(Duration) + Send + Sync;

/// Timer configuration
#[derive(Debug, Clone, Copy)]
pub struct TimerOptions {
    /// Ceiling for the elapsed time; the timer pauses itself once reached
    pub duration: Duration,
    /// How often the tick callback runs
    pub tick_interval: Duration,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(8760 * 3600),
            tick_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
enum Control {
    Run,
    Pause,
}

#[derive(Debug, Default)]
struct Clock {
    /// Elapsed time accumulated up to `resumed_at`
    base: Duration,
    /// Set while running
    resumed_at: Option<Instant>,
    stopped: bool,
}

impl Clock {
    fn elapsed(&self, ceiling: Duration) -> Duration {
        let running = self.resumed_at.map(|t| t.elapsed()).unwrap_or_default();
        (self.base + running).min(ceiling)
    }

    fn freeze(&mut self, ceiling: Duration) {
        self.base = self.elapsed(ceiling);
        self.resumed_at = None;
    }
}

struct Shared {
    options: TimerOptions,
    clock: Mutex<Clock>,
    on_tick: Box<TickFn>,
}

/// Simulated playback clock with a periodic tick
pub struct Timer {
    shared: Arc<Shared>,
    control: Mutex<Option<Sender<Control>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn new(options: TimerOptions, on_tick: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                clock: Mutex::new(Clock::default()),
                on_tick: Box::new(on_tick),
            }),
            control: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Start or resume the clock
    ///
    /// No-op if already running or if the timer has been stopped.
    pub fn start(&self) {
        {
            let mut clock = self.shared.clock.lock();
            if clock.stopped || clock.resumed_at.is_some() {
                return;
            }
            if clock.base >= self.shared.options.duration {
                return;
            }
            clock.resumed_at = Some(Instant::now());
        }

        let mut control = self.control.lock();
        match control.as_ref() {
            Some(tx) => {
                let _ = tx.send(Control::Run);
            }
            None => {
                let (tx, rx) = channel::unbounded();
                let shared = Arc::clone(&self.shared);
                let spawned = thread::Builder::new()
                    .name("playback-timer".to_string())
                    .spawn(move || tick_loop(shared, rx));
                match spawned {
                    Ok(handle) => {
                        *self.handle.lock() = Some(handle);
                        *control = Some(tx);
                    }
                    Err(e) => {
                        // The clock still advances, only the ticks are lost
                        tracing::warn!("Failed to spawn timer thread: {}", e);
                    }
                }
            }
        }
    }

    /// Freeze the clock; the tick thread stays parked until the next start
    pub fn pause(&self) {
        let mut clock = self.shared.clock.lock();
        if clock.resumed_at.is_none() {
            return;
        }
        clock.freeze(self.shared.options.duration);
        drop(clock);

        if let Some(tx) = self.control.lock().as_ref() {
            let _ = tx.send(Control::Pause);
        }
    }

    /// Freeze the clock for good and terminate the tick thread
    pub fn stop(&self) {
        {
            let mut clock = self.shared.clock.lock();
            clock.freeze(self.shared.options.duration);
            clock.stopped = true;
        }

        // Disconnecting the control channel ends the loop
        self.control.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    /// Override the elapsed time, e.g. after a seek
    pub fn set_elapsed(&self, elapsed: Duration) {
        let mut clock = self.shared.clock.lock();
        clock.base = elapsed.min(self.shared.options.duration);
        if clock.resumed_at.is_some() {
            clock.resumed_at = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.clock.lock().elapsed(self.shared.options.duration)
    }

    pub fn is_running(&self) -> bool {
        self.shared.clock.lock().resumed_at.is_some()
    }

    pub fn options(&self) -> TimerOptions {
        self.shared.options
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("options", &self.shared.options)
            .field("elapsed", &self.elapsed())
            .field("running", &self.is_running())
            .finish()
    }
}

fn tick_loop(shared: Arc<Shared>, control: Receiver<Control>) {
    let interval = shared.options.tick_interval;
    let mut running = true;

    loop {
        if !running {
            match control.recv() {
                Ok(Control::Run) => running = true,
                Ok(Control::Pause) => continue,
                Err(_) => return,
            }
        }

        match control.recv_timeout(interval) {
            Ok(Control::Pause) => {
                running = false;
                continue;
            }
            Ok(Control::Run) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let (elapsed, still_running) = {
            let mut clock = shared.clock.lock();
            if clock.resumed_at.is_none() {
                // Paused between the timeout and here; the Pause message follows
                continue;
            }
            let elapsed = clock.elapsed(shared.options.duration);
            if elapsed >= shared.options.duration {
                clock.freeze(shared.options.duration);
                (elapsed, false)
            } else {
                (elapsed, true)
            }
        };

        (shared.on_tick)(elapsed);
        if !still_running {
            tracing::debug!("Timer reached its ceiling of {:?}", shared.options.duration);
            running = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_options() -> TimerOptions {
        TimerOptions {
            duration: Duration::from_secs(3600),
            tick_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_new_timer_is_idle() {
        let timer = Timer::new(fast_options(), |_| {});
        assert!(!timer.is_running());
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_start_advances_and_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let timer = Timer::new(fast_options(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        timer.start();
        assert!(timer.is_running());
        thread::sleep(Duration::from_millis(80));

        assert!(timer.elapsed() >= Duration::from_millis(50));
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let timer = Timer::new(fast_options(), |_| {});
        timer.start();
        thread::sleep(Duration::from_millis(30));
        timer.pause();

        let frozen = timer.elapsed();
        thread::sleep(Duration::from_millis(40));
        assert_eq!(timer.elapsed(), frozen);
        assert!(!timer.is_running());
    }

    #[test]
    fn test_resume_continues_from_frozen_value() {
        let timer = Timer::new(fast_options(), |_| {});
        timer.start();
        thread::sleep(Duration::from_millis(20));
        timer.pause();
        let frozen = timer.elapsed();

        timer.start();
        thread::sleep(Duration::from_millis(20));
        assert!(timer.elapsed() > frozen);
    }

    #[test]
    fn test_pause_stops_ticks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let timer = Timer::new(fast_options(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        timer.start();
        thread::sleep(Duration::from_millis(40));
        timer.pause();
        thread::sleep(Duration::from_millis(20));
        let after_pause = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_pause);
    }

    #[test]
    fn test_set_elapsed_overrides() {
        let timer = Timer::new(fast_options(), |_| {});
        timer.set_elapsed(Duration::from_secs(42));
        assert_eq!(timer.elapsed(), Duration::from_secs(42));

        timer.start();
        timer.set_elapsed(Duration::from_secs(90));
        let elapsed = timer.elapsed();
        assert!(elapsed >= Duration::from_secs(90));
        assert!(elapsed < Duration::from_secs(90) + Duration::from_millis(50));
    }

    #[test]
    fn test_stop_is_final() {
        let timer = Timer::new(fast_options(), |_| {});
        timer.start();
        timer.stop();
        assert!(!timer.is_running());

        timer.start();
        assert!(!timer.is_running());
    }

    #[test]
    fn test_ceiling_pauses_timer() {
        let timer = Timer::new(
            TimerOptions {
                duration: Duration::from_millis(30),
                tick_interval: Duration::from_millis(5),
            },
            |_| {},
        );
        timer.start();
        thread::sleep(Duration::from_millis(100));

        assert_eq!(timer.elapsed(), Duration::from_millis(30));
        assert!(!timer.is_running());
    }

    #[test]
    fn test_start_twice_is_noop() {
        let timer = Timer::new(fast_options(), |_| {});
        timer.start();
        thread::sleep(Duration::from_millis(20));
        let before = timer.elapsed();
        timer.start();
        assert!(timer.elapsed() >= before);
    }
}
