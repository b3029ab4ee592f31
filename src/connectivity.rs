//! Connectivity signal and the auto-sync glue built on it.
//!
//! The engine does not detect network state itself; an external detector
//! (platform reachability API, a ping probe, the UI's manual toggle) feeds
//! `ConnectivityMonitor::set_online`. The `AutoSyncController` watches for
//! offline-to-online edges and kicks off a drain when mutations are waiting.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::ActionTransport;
use crate::models::DrainReport;
use crate::queue::PendingQueue;
use crate::storage::StorageAdapter;
use crate::sync::SyncOrchestrator;

/// Boolean "is the device online" observable with edge-triggered
/// transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    /// Report the current network state. Subscribers are only woken when the
    /// value actually changes.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            info!(online, "Connectivity changed");
            *current = online;
            true
        });
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Invokes the orchestrator on offline-to-online transitions and exposes the
/// queue depth for UI display.
pub struct AutoSyncController<S, T> {
    orchestrator: Arc<SyncOrchestrator<S, T>>,
    queue: PendingQueue<S>,
    last_online: bool,
}

impl<S: StorageAdapter, T: ActionTransport> AutoSyncController<S, T> {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator<S, T>>,
        queue: PendingQueue<S>,
        initially_online: bool,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            last_online: initially_online,
        }
    }

    /// Number of mutations waiting for delivery. Polled by the UI,
    /// independent of whether a drain is running.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Feed one connectivity observation. On a rising edge with a non-empty
    /// queue and no drain in progress, runs exactly one drain and returns
    /// its report so the caller can notify the user.
    pub async fn handle_transition(&mut self, online: bool) -> Option<DrainReport> {
        let rising = online && !self.last_online;
        self.last_online = online;

        if !rising {
            return None;
        }
        if self.queue.is_empty() {
            debug!("Back online with empty queue, nothing to sync");
            return None;
        }
        if self.orchestrator.is_draining() {
            debug!("Back online but a drain is already running");
            return None;
        }

        info!(pending = self.queue.len(), "Back online, draining pending queue");
        Some(self.orchestrator.drain().await)
    }

    /// Observe a connectivity receiver until its monitor is dropped. Spawn
    /// this on the runtime to get hands-off sync-on-reconnect.
    pub async fn run(mut self, mut signal: watch::Receiver<bool>) {
        loop {
            if signal.changed().await.is_err() {
                debug!("Connectivity monitor dropped, auto-sync stopping");
                break;
            }
            let online = *signal.borrow_and_update();
            if let Some(report) = self.handle_transition(online).await {
                info!(
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "Auto-sync drain finished"
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::{ActionKind, PendingAction};
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingTransport {
        deliveries: AtomicUsize,
        fail: bool,
    }

    impl ActionTransport for CountingTransport {
        async fn deliver(&self, _action: &PendingAction) -> Result<(), ApiError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::Http {
                    status: 503,
                    message: "Service Unavailable".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn controller(
        transport: CountingTransport,
        initially_online: bool,
    ) -> (
        PendingQueue<MemoryStorage>,
        AutoSyncController<MemoryStorage, CountingTransport>,
    ) {
        let queue = PendingQueue::new(Arc::new(MemoryStorage::new()));
        let orchestrator = Arc::new(SyncOrchestrator::new(queue.clone(), transport));
        let controller = AutoSyncController::new(orchestrator, queue.clone(), initially_online);
        (queue, controller)
    }

    #[tokio::test]
    async fn test_rising_edge_drains_pending_queue() {
        let (queue, mut controller) = controller(CountingTransport::default(), false);
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({"name": "maize"}))
            .unwrap();
        queue
            .enqueue(ActionKind::Create, "health-scan", json!({}))
            .unwrap();

        let report = controller.handle_transition(true).await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_no_drain_without_edge() {
        let (queue, mut controller) = controller(CountingTransport::default(), true);
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();

        // Already online: a repeated "online" observation is not an edge.
        assert!(controller.handle_transition(true).await.is_none());
        // Going offline is the wrong edge.
        assert!(controller.handle_transition(false).await.is_none());
        assert_eq!(queue.len(), 1);

        // Coming back up is.
        assert!(controller.handle_transition(true).await.is_some());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failed_drain_counts_are_surfaced() {
        let (queue, mut controller) = controller(
            CountingTransport {
                fail: true,
                ..CountingTransport::default()
            },
            false,
        );
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();

        let report = controller.handle_transition(true).await.unwrap();
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 1);
        // The action stays queued for the next reconnect.
        assert_eq!(controller.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_rising_edge_with_empty_queue_is_noop() {
        let (_, mut controller) = controller(CountingTransport::default(), false);
        assert!(controller.handle_transition(true).await.is_none());
    }

    #[tokio::test]
    async fn test_pending_count_tracks_queue() {
        let (queue, controller) = controller(CountingTransport::default(), false);
        assert_eq!(controller.pending_count(), 0);
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();
        assert_eq!(controller.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_monitor_only_signals_real_transitions() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        rx.borrow_and_update();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_run_loop_drains_on_reconnect() {
        let queue = PendingQueue::new(Arc::new(MemoryStorage::new()));
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            queue.clone(),
            CountingTransport::default(),
        ));

        // Observe the status broadcast to know when the drain has happened.
        let done = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&done);
        orchestrator.on_status_change(move |status| {
            if status != crate::models::SyncStatus::Syncing {
                *flag.lock().unwrap() = true;
            }
        });

        let monitor = ConnectivityMonitor::new(false);
        let controller = AutoSyncController::new(orchestrator, queue.clone(), false);
        let task = tokio::spawn(controller.run(monitor.subscribe()));

        monitor.set_online(true);
        // Dropping the monitor ends the loop once the edge is processed.
        drop(monitor);
        task.await.unwrap();

        assert!(*done.lock().unwrap());
        assert!(queue.is_empty());
    }
}
