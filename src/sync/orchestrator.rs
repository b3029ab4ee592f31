//! Single-flight drain of the pending-action queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::api::ActionTransport;
use crate::models::{ActionOutcome, DrainReport, PendingAction, SyncStatus};
use crate::queue::PendingQueue;
use crate::storage::StorageAdapter;

/// Delivery attempts before an action is dropped from the queue.
/// Three drains' worth of failures usually means the payload itself is bad
/// (validation error, deleted parent resource), not a flaky network.
const MAX_ATTEMPTS: u32 = 3;

/// Handle returned by `on_status_change`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type StatusListener = Arc<dyn Fn(SyncStatus) + Send + Sync>;

/// Drains the pending queue against the remote API.
///
/// The single-flight flag is in-memory only: two engine instances over the
/// same storage directory (two processes, two tabs sharing an origin) can
/// still race on the persisted queue. The engine assumes a single active
/// instance per device.
pub struct SyncOrchestrator<S, T> {
    queue: PendingQueue<S>,
    transport: T,

    /// Set before the first suspension point of a drain, cleared after the
    /// loop. Checked-and-set synchronously, so within one runtime context it
    /// gives true mutual exclusion without a lock.
    in_flight: AtomicBool,

    listeners: Mutex<Vec<(u64, StatusListener)>>,
    next_listener_id: AtomicU64,

    max_attempts: u32,
}

impl<S: StorageAdapter, T: ActionTransport> SyncOrchestrator<S, T> {
    pub fn new(queue: PendingQueue<S>, transport: T) -> Self {
        Self {
            queue,
            transport,
            in_flight: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Override the retry ceiling. Mostly for tests; production keeps the
    /// default of 3.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// True while a drain is running.
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register a listener for status transitions. Listeners are invoked in
    /// registration order, once per transition.
    pub fn on_status_change(
        &self,
        listener: impl Fn(SyncStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let mut listeners = self.listeners.lock().expect("listener mutex poisoned");
        listeners.push((id, Arc::new(listener)));
        SubscriptionId(id)
    }

    /// Remove exactly the listener registered under `id`.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut listeners = self.listeners.lock().expect("listener mutex poisoned");
        listeners.retain(|(listener_id, _)| *listener_id != id.0);
    }

    /// Invoke every registered listener, in registration order, outside the
    /// registry lock. A callback may subscribe or unsubscribe (itself
    /// included) without deadlocking the drain; a listener removed mid-
    /// broadcast still receives the transition that was already in flight.
    fn broadcast(&self, status: SyncStatus) {
        let snapshot: Vec<StatusListener> = {
            let listeners = self.listeners.lock().expect("listener mutex poisoned");
            listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(status);
        }
    }

    /// Drain the queue: deliver every pending action sequentially in FIFO
    /// order, one network call at a time.
    ///
    /// If a drain is already in progress this returns an empty report
    /// immediately without touching the queue. A failure on one action never
    /// aborts the rest of the batch; an action that has now failed
    /// `max_attempts` times is dropped and reported in `abandoned`.
    pub async fn drain(&self) -> DrainReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain already in progress, skipping");
            return DrainReport::default();
        }

        self.broadcast(SyncStatus::Syncing);

        let snapshot = self.queue.list();
        info!(pending = snapshot.len(), "Starting sync drain");

        let mut report = DrainReport::default();
        for action in &snapshot {
            match self.process(action).await {
                ActionOutcome::Delivered => report.succeeded += 1,
                ActionOutcome::Retrying(attempts) => {
                    report.failed += 1;
                    debug!(id = %action.id, attempts, "Action will be retried next drain");
                }
                ActionOutcome::Abandoned => {
                    report.failed += 1;
                    report.abandoned.push(action.id);
                }
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);

        let status = if report.failed == 0 {
            SyncStatus::Complete
        } else {
            SyncStatus::Error
        };
        self.broadcast(status);

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            abandoned = report.abandoned.len(),
            "Sync drain finished"
        );
        report
    }

    /// Deliver one action and do the retry bookkeeping.
    async fn process(&self, action: &PendingAction) -> ActionOutcome {
        match self.transport.deliver(action).await {
            Ok(()) => {
                if let Err(e) = self.queue.remove(action.id) {
                    warn!(id = %action.id, error = %e, "Delivered but failed to dequeue");
                }
                ActionOutcome::Delivered
            }
            Err(e) => {
                let message = e.to_string();
                warn!(id = %action.id, resource = %action.resource, error = %message,
                    "Delivery failed");
                if let Err(e) = self.queue.record_failure(action.id, &message) {
                    warn!(id = %action.id, error = %e, "Failed to record delivery failure");
                }

                // The snapshot predates this failure, so the live count is
                // one higher than the snapshot's.
                let attempts = action.retry_count + 1;
                if attempts >= self.max_attempts {
                    warn!(id = %action.id, attempts, "Retry budget exhausted, dropping action");
                    if let Err(e) = self.queue.remove(action.id) {
                        warn!(id = %action.id, error = %e, "Failed to drop exhausted action");
                    }
                    ActionOutcome::Abandoned
                } else {
                    ActionOutcome::Retrying(attempts)
                }
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
    use crate::models::ActionKind;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::Notify;
    use uuid::Uuid;

    /// Scripted transport: records delivery order, fails ids on a deny list,
    /// optionally parks until released so drains can be held open.
    #[derive(Default)]
    struct MockTransport {
        delivered: Mutex<Vec<Uuid>>,
        fail_ids: Mutex<HashSet<Uuid>>,
        fail_all: AtomicBool,
        gate: Option<Arc<Notify>>,
        started: Arc<Notify>,
    }

    impl MockTransport {
        fn failing_all() -> Self {
            let transport = Self::default();
            transport.fail_all.store(true, Ordering::SeqCst);
            transport
        }

        fn fail_id(&self, id: Uuid) {
            self.fail_ids.lock().unwrap().insert(id);
        }

        fn delivered(&self) -> Vec<Uuid> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl ActionTransport for MockTransport {
        async fn deliver(&self, action: &PendingAction) -> Result<(), ApiError> {
            self.started.notify_one();
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            if self.fail_all.load(Ordering::SeqCst)
                || self.fail_ids.lock().unwrap().contains(&action.id)
            {
                return Err(ApiError::Http {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                });
            }
            self.delivered.lock().unwrap().push(action.id);
            Ok(())
        }
    }

    fn queue() -> PendingQueue<MemoryStorage> {
        PendingQueue::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_drain_delivers_fifo_and_empties_queue() {
        let queue = queue();
        let a = queue
            .enqueue(ActionKind::Create, "crop-batch", json!({"name": "maize"}))
            .unwrap();
        let b = queue
            .enqueue(ActionKind::Create, "health-scan", json!({"leaf": "spotty"}))
            .unwrap();

        let orchestrator = SyncOrchestrator::new(queue.clone(), MockTransport::default());
        let report = orchestrator.drain().await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert!(report.abandoned.is_empty());
        assert!(queue.is_empty());
        // A was enqueued first, so its network call went out first.
        assert_eq!(orchestrator.transport.delivered(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_status_sequence_on_success() {
        let queue = queue();
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();

        let orchestrator = SyncOrchestrator::new(queue, MockTransport::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.on_status_change(move |status| sink.lock().unwrap().push(status));

        orchestrator.drain().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncStatus::Syncing, SyncStatus::Complete]
        );
    }

    #[tokio::test]
    async fn test_failure_on_one_action_does_not_abort_batch() {
        let queue = queue();
        let a = queue
            .enqueue(ActionKind::Update, "crop-batch", json!({"id": "b1"}))
            .unwrap();
        let b = queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();

        let transport = MockTransport::default();
        transport.fail_id(a);
        let orchestrator = SyncOrchestrator::new(queue.clone(), transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.on_status_change(move |status| sink.lock().unwrap().push(status));

        let report = orchestrator.drain().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncStatus::Syncing, SyncStatus::Error]
        );

        // The failed action stays queued with its error recorded; the
        // delivered one is gone.
        let remaining = queue.list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, a);
        assert_eq!(remaining[0].retry_count, 1);
        assert!(remaining[0].last_error.as_deref().unwrap().contains("500"));
        assert_eq!(orchestrator.transport.delivered(), vec![b]);
    }

    #[tokio::test]
    async fn test_action_dropped_after_third_failed_drain() {
        let queue = queue();
        let id = queue
            .enqueue(ActionKind::Update, "crop-batch", json!({"id": "b1"}))
            .unwrap();

        let orchestrator = SyncOrchestrator::new(queue.clone(), MockTransport::failing_all());

        let first = orchestrator.drain().await;
        assert_eq!(first.failed, 1);
        assert!(first.abandoned.is_empty());
        assert_eq!(queue.list()[0].retry_count, 1);

        let second = orchestrator.drain().await;
        assert!(second.abandoned.is_empty());
        assert_eq!(queue.list()[0].retry_count, 2);

        let third = orchestrator.drain().await;
        assert_eq!(third.failed, 1);
        assert_eq!(third.abandoned, vec![id]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_second_drain_while_first_running_is_noop() {
        let queue = queue();
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();

        let gate = Arc::new(Notify::new());
        let transport = MockTransport {
            gate: Some(Arc::clone(&gate)),
            ..MockTransport::default()
        };
        let started = Arc::clone(&transport.started);
        let orchestrator = Arc::new(SyncOrchestrator::new(queue.clone(), transport));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.drain().await })
        };

        // Wait until the first drain is inside its network call.
        started.notified().await;
        assert!(orchestrator.is_draining());

        let second = orchestrator.drain().await;
        assert_eq!(second, DrainReport::default());
        // The queue and the in-flight request are untouched.
        assert_eq!(queue.len(), 1);

        gate.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.succeeded, 1);
        assert!(queue.is_empty());
        assert!(!orchestrator.is_draining());
    }

    #[tokio::test]
    async fn test_unsubscribed_listener_is_not_invoked() {
        let queue = queue();
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();
        let orchestrator = SyncOrchestrator::new(queue, MockTransport::default());

        let first_calls = Arc::new(Mutex::new(0usize));
        let second_calls = Arc::new(Mutex::new(0usize));

        let sink = Arc::clone(&first_calls);
        let first = orchestrator.on_status_change(move |_| *sink.lock().unwrap() += 1);
        let sink = Arc::clone(&second_calls);
        orchestrator.on_status_change(move |_| *sink.lock().unwrap() += 1);

        orchestrator.unsubscribe(first);
        orchestrator.drain().await;

        assert_eq!(*first_calls.lock().unwrap(), 0);
        // Syncing + Complete
        assert_eq!(*second_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_one_shot_listener_can_unsubscribe_inside_callback() {
        let queue = queue();
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();
        let orchestrator = Arc::new(SyncOrchestrator::new(queue, MockTransport::default()));

        // "Notify me once sync starts, then stop listening": the callback
        // unsubscribes itself, which must not deadlock the broadcast.
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        let slot = Arc::clone(&subscription);
        let handle = Arc::clone(&orchestrator);
        let id = orchestrator.on_status_change(move |status| {
            sink.lock().unwrap().push(status);
            if let Some(id) = slot.lock().unwrap().take() {
                handle.unsubscribe(id);
            }
        });
        *subscription.lock().unwrap() = Some(id);

        let report = orchestrator.drain().await;
        assert_eq!(report.succeeded, 1);
        // Fired for Syncing, then removed itself before Complete.
        assert_eq!(*seen.lock().unwrap(), vec![SyncStatus::Syncing]);
    }

    #[tokio::test]
    async fn test_listener_can_subscribe_inside_callback() {
        let queue = queue();
        queue
            .enqueue(ActionKind::Create, "crop-batch", json!({}))
            .unwrap();
        let orchestrator = Arc::new(SyncOrchestrator::new(queue, MockTransport::default()));

        let late_calls = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&late_calls);
        let handle = Arc::clone(&orchestrator);
        let registered = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&registered);
        orchestrator.on_status_change(move |_| {
            let mut registered = flag.lock().unwrap();
            if !*registered {
                *registered = true;
                let sink = Arc::clone(&sink);
                handle.on_status_change(move |_| *sink.lock().unwrap() += 1);
            }
        });

        orchestrator.drain().await;
        // Registered during the Syncing broadcast, invoked for Complete.
        assert_eq!(*late_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_with_empty_queue_reports_complete() {
        let orchestrator = SyncOrchestrator::new(queue(), MockTransport::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        orchestrator.on_status_change(move |status| sink.lock().unwrap().push(status));

        let report = orchestrator.drain().await;
        assert!(report.is_empty());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncStatus::Syncing, SyncStatus::Complete]
        );
    }
}
