//! Change notifications via the `idle` command
//!
//! A [`Watcher`] owns its own connection, because a connection blocked in
//! `idle` cannot be used for anything else. A background thread loops on
//! `idle` and forwards the name of every changed subsystem.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::stream::Stream;
use crate::{Client, MpdError, Result};

/// Subscription to MPD subsystem changes
#[derive(Debug)]
pub struct Watcher {
    events: Receiver<String>,
    errors: Receiver<MpdError>,
    control: Mutex<Stream>,
    closed: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    /// Connect and start watching the given subsystems
    ///
    /// An empty `subsystems` slice watches everything.
    pub fn new(
        network: &str,
        address: &str,
        password: Option<&str>,
        subsystems: &[&str],
    ) -> Result<Self> {
        let mut client = Client::dial_idle(network, address)?;
        if let Some(password) = password {
            client.password(password)?;
        }

        let control = client.shutdown_handle()?;
        let (event_tx, events) = channel::unbounded();
        let (error_tx, errors) = channel::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let subsystems: Vec<String> = subsystems.iter().map(|s| s.to_string()).collect();

        let thread_closed = Arc::clone(&closed);
        let handle = thread::Builder::new()
            .name("mpd-watcher".to_string())
            .spawn(move || idle_loop(client, subsystems, event_tx, error_tx, thread_closed))?;

        Ok(Self {
            events,
            errors,
            control: Mutex::new(control),
            closed,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Names of changed subsystems, in arrival order
    pub fn events(&self) -> Receiver<String> {
        self.events.clone()
    }

    /// Errors raised by the background connection
    pub fn errors(&self) -> Receiver<MpdError> {
        self.errors.clone()
    }

    /// Stop watching and join the background thread
    ///
    /// Calling this more than once is harmless.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut control = self.control.lock();
            let _ = control.write_all(b"noidle\n");
            // The reader may already be gone, in which case the socket is too
            if let Err(e) = control.shutdown() {
                tracing::debug!("Watcher socket shutdown: {}", e);
            }
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                return Err(MpdError::Protocol("Watcher thread panicked".to_string()));
            }
        }

        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn idle_loop(
    mut client: Client,
    subsystems: Vec<String>,
    event_tx: Sender<String>,
    error_tx: Sender<MpdError>,
    closed: Arc<AtomicBool>,
) {
    let subsystems: Vec<&str> = subsystems.iter().map(String::as_str).collect();
    tracing::debug!("Watcher started for {:?}", subsystems);

    loop {
        match client.idle(&subsystems) {
            Ok(changed) => {
                for subsystem in changed {
                    if event_tx.send(subsystem).is_err() {
                        tracing::debug!("Watcher event receiver dropped, stopping");
                        return;
                    }
                }
            }
            Err(_) if closed.load(Ordering::SeqCst) => break,
            Err(e) => {
                tracing::warn!("Watcher connection failed: {}", e);
                let _ = error_tx.send(e);
                break;
            }
        }

        if closed.load(Ordering::SeqCst) {
            break;
        }
    }

    tracing::debug!("Watcher stopped");
}
