//! Background refresh thread.
//!
//! Architecture: one named thread wakes up every period and runs a tick
//! closure. A stop channel doubles as the sleep, so stopping never waits a
//! whole period; a second channel reports that the loop has exited.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

/// Extra time granted to an in-flight tick when stopping.
const STOP_GRACE: Duration = Duration::from_millis(250);

/// Handle to a running refresh thread.
#[derive(Debug)]
pub struct Refresher {
    period: Duration,
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Refresher {
    /// Run `tick` every `period` until stopped or until `tick` returns false.
    pub fn spawn<F>(period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("progress-table-refresh".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !tick() {
                                break;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
            })?;

        debug!(?period, "refresh thread started");
        Ok(Self {
            period,
            stop_tx,
            done_rx,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait at most one period (plus a short grace)
    /// for it to exit. A thread that does not answer in time is detached.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        let Some(handle) = self.handle.take() else {
            return;
        };
        match self.done_rx.recv_timeout(self.period + STOP_GRACE) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("refresh thread panicked");
                }
                debug!("refresh thread stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(period = ?self.period, "refresh thread did not stop in time, detaching");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
