//! Shutdown signalling for long-lived loops
//!
//! One [`Shutdown`] is owned by the supervising context. Each scheduled task
//! holds its own [`ShutdownToken`] and exits at its next await point once
//! shutdown is triggered. There is no drain phase: restart and sweep
//! operations are safe to abandon mid-flight.

use tokio::sync::watch;
use tracing::info;

/// Owner side of the shutdown signal
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Cancellation token handed to each task
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel every task holding a token
    pub fn trigger(&self) {
        info!("Shutdown requested");
        self.tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    /// Resolves once shutdown is triggered or the owner is gone
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
