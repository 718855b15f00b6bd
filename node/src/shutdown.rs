//! Node-wide shutdown signal.
//!
//! A single broadcast that every service loop selects on. It fires at most
//! once, whether triggered by an OS signal or by [`ShutdownController::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::broadcast;

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    fired: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(1).0,
            fired: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Only the first caller gets `true`.
    pub fn shutdown(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        if first {
            let _ = self.tx.send(());
        }
        first
    }

    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolve on SIGINT, SIGTERM or a programmatic shutdown, firing the
    /// signal for the OS cases.
    pub async fn wait_for_signal(&self) {
        // Subscribe before checking so a concurrent shutdown is not missed.
        let mut fired = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        tokio::select! {
            _ = signal::ctrl_c() => tracing::info!("received SIGINT"),
            name = terminate() => tracing::info!("received {name}"),
            _ = fired.recv() => return,
        }
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
            "SIGTERM"
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    std::future::pending().await
}
