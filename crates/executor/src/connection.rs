//! Shared connection to the remote execution environment.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolgate_core::InvocationError;
use tracing::{debug, info};

/// Lazily-opened HTTP client shared by every invocation of a process.
///
/// [`RemoteConnection::shutdown`] drops the shared client; calls already
/// holding an `Arc` to it finish normally, and the next call opens a new one.
pub struct RemoteConnection {
    timeout: Duration,
    client: Mutex<Option<Arc<reqwest::Client>>>,
    opened: AtomicUsize,
}

impl RemoteConnection {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: Mutex::new(None),
            opened: AtomicUsize::new(0),
        }
    }

    /// Return the shared client, opening it on first use.
    pub fn client(&self) -> Result<Arc<reqwest::Client>, InvocationError> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| InvocationError::RemoteFailed(format!("Failed to open connection: {}", e)))?;
        let client = Arc::new(client);
        *slot = Some(client.clone());
        let opened = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Opened remote connection (#{})", opened);
        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.client.lock().is_some()
    }

    /// Drop the shared client. Idempotent.
    pub fn shutdown(&self) {
        if self.client.lock().take().is_some() {
            info!("Remote connection closed");
        }
    }

    /// How many times a client has been opened over the connection's life.
    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Default for RemoteConnection {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
