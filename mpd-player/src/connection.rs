//! Shared daemon connection
//!
//! One command connection is shared by everything that talks to the daemon.
//! It is checked with a `ping` before every use and silently replaced when
//! the check fails. Failing to dial is reported as [`PlayerError::Dial`],
//! which callers treat as fatal: there is no retry or backoff here.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::daemon::{DaemonClient, Dialer};
use crate::{PlayerError, Result};

/// Lazily dialed, liveness-checked daemon connection
pub struct ConnectionManager {
    dialer: Arc<dyn Dialer>,
    client: Mutex<Option<Box<dyn DaemonClient>>>,
}

impl ConnectionManager {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            client: Mutex::new(None),
        }
    }

    pub fn dialer(&self) -> &Arc<dyn Dialer> {
        &self.dialer
    }

    /// Run `f` against a live client
    ///
    /// The connection lock is held for the duration of `f`, so calls from
    /// different threads never interleave on the wire.
    pub fn with_client<T>(
        &self,
        f: impl FnOnce(&mut dyn DaemonClient) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.client.lock();

        if let Some(client) = guard.as_mut() {
            if let Err(e) = client.ping() {
                tracing::warn!("Daemon connection lost ({}), reconnecting", e);
                *guard = None;
            }
        }

        if guard.is_none() {
            let client = self.dialer.dial().map_err(|source| PlayerError::Dial {
                address: self.dialer.address(),
                source,
            })?;
            tracing::debug!("Connected to daemon at {}", self.dialer.address());
            *guard = Some(client);
        }

        match guard.as_mut() {
            Some(client) => f(client.as_mut()),
            None => Err(PlayerError::Closed),
        }
    }

    /// Stop playback and drop the connection; both steps are best-effort
    pub fn close(&self) {
        let Some(mut client) = self.client.lock().take() else {
            return;
        };

        if let Err(e) = client.stop() {
            tracing::warn!("Failed to stop daemon on close: {}", e);
        }
        if let Err(e) = client.close() {
            tracing::warn!("Failed to close daemon connection: {}", e);
        }
    }

    /// Whether a connection is currently cached
    pub fn is_connected(&self) -> bool {
        self.client.lock().is_some()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.dialer.address())
            .field("connected", &self.is_connected())
            .finish()
    }
}
