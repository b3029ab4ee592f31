//! Transient sync state reported by the orchestrator.

use uuid::Uuid;

/// State of the current orchestrator run, broadcast to subscribers.
/// Not persisted; exists only for the duration of one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// A drain has started.
    Syncing,
    /// The drain finished with every action delivered.
    Complete,
    /// The drain finished with at least one failure.
    Error,
}

/// Outcome of one action within a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Delivered and removed from the queue.
    Delivered,
    /// Failed; stays queued with the given attempt count.
    Retrying(u32),
    /// Failed and removed after exhausting the retry budget.
    Abandoned,
}

/// Aggregate result of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions delivered and removed from the queue.
    pub succeeded: usize,

    /// Actions that failed this drain (including those abandoned).
    pub failed: usize,

    /// Actions dropped after exhausting their retry budget. Surfaced so a
    /// caller can tell the user instead of losing the mutation silently.
    pub abandoned: Vec<Uuid>,
}

impl DrainReport {
    /// True when the drain was a no-op (empty queue or single-flight skip).
    pub fn is_empty(&self) -> bool {
        self.succeeded == 0 && self.failed == 0
    }
}
