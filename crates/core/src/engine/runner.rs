//! Background scheduler loop for the reconciliation engine.
//!
//! One long-lived task runs `reconcile_all` on a fixed timer, independent of
//! the interactive API. Shutdown is signalled over a broadcast channel and
//! takes effect between series, never mid-item.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::reconciler::Reconciler;

impl Reconciler {
    /// Start the scheduler (spawns the background pass loop).
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }

        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(engine.scheduler.poll_interval_secs);

        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                "reconciliation loop started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("reconciliation loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !engine.running.load(Ordering::Relaxed) {
                            break;
                        }
                        engine.reconcile_all().await;
                    }
                }
            }
            info!("reconciliation loop stopped");
        });
    }

    /// Stop the scheduler gracefully.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("scheduler not running");
            return;
        }

        info!("stopping scheduler");
        let _ = self.shutdown_tx.send(());
    }
}
