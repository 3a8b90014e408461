//! Shutdown coordination
//!
//! Turns operator signals into a single broadcast that the process waits on
//! before draining the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across the application
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        // Room for a burst of signals
        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let coordinator = Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        };
        (coordinator, shutdown_rx)
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Trigger shutdown
    pub fn trigger_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has been requested.
    ///
    /// Returns immediately when the request happened before the call.
    pub async fn requested(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Install process signal handlers that trigger this coordinator
    pub fn install_signal_handlers(&self) {
        setup_signal_handlers(self.shutdown_tx.clone(), self.shutdown_requested.clone());
    }
}

/// Set up signal handlers for graceful shutdown
///
/// The first signal starts the drain; a second one exits with status 130
/// without waiting for it.
fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>, shutdown_requested: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        use std::sync::atomic::AtomicUsize;
        use tokio::signal::unix::{signal, SignalKind};
        let signal_count = Arc::new(AtomicUsize::new(0));
        let signals = [
            SignalKind::interrupt(),
            SignalKind::terminate(),
            SignalKind::hangup(),
            SignalKind::quit(),
        ];

        for kind in signals {
            let tx = shutdown_tx.clone();
            let requested = shutdown_requested.clone();
            let sig_ctr = signal_count.clone();

            tokio::spawn(async move {
                let mut sig = match signal(kind) {
                    Ok(sig) => sig,
                    Err(e) => {
                        log::warn!("Unable to install handler for {:?}: {}", kind, e);
                        return;
                    }
                };
                while sig.recv().await.is_some() {
                    let prev = sig_ctr.fetch_add(1, Ordering::AcqRel);
                    requested.store(true, Ordering::Release);
                    let _ = tx.send(());
                    if prev >= 1 {
                        log::warn!("Second shutdown signal received; exiting without drain");
                        std::process::exit(130);
                    }
                    log::info!("Shutdown signal received; draining");
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            let mut seen = false;
            while tokio::signal::ctrl_c().await.is_ok() {
                shutdown_requested.store(true, Ordering::Release);
                let _ = shutdown_tx.send(());
                if seen {
                    std::process::exit(130);
                }
                seen = true;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shutdown_coordinator_creation() {
        let (coordinator, _rx) = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_shutdown_coordinator_trigger() {
        let (coordinator, mut rx) = ShutdownCoordinator::new();

        coordinator.trigger_shutdown();

        assert!(coordinator.is_shutdown_requested());
        let signal_received = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(signal_received.is_ok(), "Should receive shutdown signal");
    }

    #[tokio::test]
    async fn test_requested_resolves_after_trigger() {
        let (coordinator, _rx) = ShutdownCoordinator::new();
        let coordinator = Arc::new(coordinator);

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.requested().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.trigger_shutdown();

        let result = timeout(Duration::from_millis(200), waiter).await;
        assert!(result.is_ok(), "requested() should resolve after trigger");
    }

    #[tokio::test]
    async fn test_requested_returns_immediately_when_already_triggered() {
        let (coordinator, _rx) = ShutdownCoordinator::new();
        coordinator.trigger_shutdown();

        let result = timeout(Duration::from_millis(50), coordinator.requested()).await;
        assert!(result.is_ok());
    }
}
