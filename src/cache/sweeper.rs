use super::TokenCache;
use crate::clock::Clock;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Background purge of expired cache entries.
///
/// Runs [`TokenCache::purge_expired`] on its own thread at a fixed interval,
/// independent of request volume. The request path never waits on it beyond
/// the per-shard locking the cache already does.
///
/// Dropping the sweeper (or calling [`Sweeper::shutdown`]) stops the thread.
pub struct Sweeper {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Sweeper {
    /// Start sweeping `cache` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper thread cannot be spawned.
    pub fn spawn(
        cache: Arc<dyn TokenCache>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("brrtgate-cache-sweeper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let purged = cache.purge_expired(clock.now_secs());
                        if purged > 0 {
                            debug!(purged, remaining = cache.size(), "token cache sweep");
                        }
                    }
                    // Explicit stop or the owning Sweeper was dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        debug!(interval_ms = interval.as_millis() as u64, "token cache sweeper started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the sweeper thread is still running
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the sweeper and wait for its thread to exit
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited; a failed send is fine.
            tx.send(()).ok();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("token cache sweeper panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
