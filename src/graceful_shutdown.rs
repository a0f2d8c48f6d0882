//! # Graceful Shutdown Module
//!
//! Shutdown handling for the gateway server.
//!
//! ## Shutdown Process:
//!
//! 1. **Signal Reception**: SIGINT (Ctrl+C), SIGTERM or SIGQUIT, or a manual [`GracefulShutdown::trigger`]
//! 2. **Stop Accepting**: `axum::serve` stops accepting new connections
//! 3. **Drain Connections**: in-flight requests, open SSE streams included, get
//!    `SHUTDOWN_TIMEOUT` seconds to finish
//! 4. **Exit**: whatever is still open after the deadline is dropped, which also
//!    drops the upstream connections behind it

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// # Graceful Shutdown Manager
///
/// Cheap to clone; every clone observes the same shutdown.
#[derive(Clone, Debug)]
pub struct GracefulShutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Start the shutdown without an OS signal.
    pub fn trigger(&self) {
        if !self.sender.send_replace(true) {
            info!("Graceful shutdown initiated");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once shutdown has been initiated.
    pub async fn triggered(&self) {
        let mut receiver = self.sender.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = receiver.wait_for(|initiated| *initiated).await;
    }

    /// Resolves on the first shutdown signal or manual trigger.
    ///
    /// Pass this to `axum::serve(..).with_graceful_shutdown(..)`.
    pub async fn wait_for_signal(self) {
        tokio::select! {
            _ = ctrl_c() => info!("Received SIGINT (Ctrl+C)"),
            _ = terminate() => info!("Received SIGTERM"),
            _ = quit() => info!("Received SIGQUIT"),
            _ = self.triggered() => {}
        }
        self.trigger();
    }

    /// Resolves `drain_timeout` after shutdown was initiated.
    pub async fn drain_deadline(&self, drain_timeout: Duration) {
        self.triggered().await;
        tokio::time::sleep(drain_timeout).await;
        warn!(
            timeout_secs = drain_timeout.as_secs(),
            "Drain timeout reached, closing remaining connections"
        );
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(err) => {
            warn!(error = %err, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    unix_signal(tokio::signal::unix::SignalKind::terminate()).await
}

#[cfg(unix)]
async fn quit() {
    unix_signal(tokio::signal::unix::SignalKind::quit()).await
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

#[cfg(not(unix))]
async fn quit() {
    std::future::pending::<()>().await
}
