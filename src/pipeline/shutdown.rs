// src/pipeline/shutdown.rs

//! Cooperative shutdown signal.
//!
//! One handle flips the flag (Ctrl-C handler in `main`); any number of
//! signal clones observe it. Long suspensions in the crawl loop select
//! against [`ShutdownSignal::wait`] so they unblock promptly instead of
//! sleeping out their full duration.

use tokio::sync::watch;

/// Sending side; flipping is one-way.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side, cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested. A dropped handle counts as a
    /// shutdown request.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
