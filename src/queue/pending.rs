//! The pending-action queue over a storage adapter.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ActionKind, PendingAction};
use crate::storage::{StorageAdapter, StorageError};

/// Single storage key holding the whole queue as one serialized list.
/// Every mutation replaces the list wholesale rather than appending, which
/// keeps the persisted representation a single atomic unit.
const QUEUE_KEY: &str = "cropsync.queue.pending";

/// Ordered, persisted list of not-yet-delivered mutations.
///
/// The queue owns its storage key exclusively: nothing else in the engine
/// writes under it. Clones share the underlying adapter, so the controller
/// can poll `len()` while the orchestrator drains.
#[derive(Debug)]
pub struct PendingQueue<S> {
    storage: Arc<S>,
}

impl<S> Clone for PendingQueue<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: StorageAdapter> PendingQueue<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Append a new action and persist the updated list. Returns the fresh
    /// action id. Repeated identical mutations are not deduplicated.
    pub fn enqueue(
        &self,
        kind: ActionKind,
        resource: &str,
        payload: Value,
    ) -> Result<Uuid, StorageError> {
        let action = PendingAction::new(kind, resource, payload);
        let id = action.id;

        let mut actions = self.load();
        actions.push(action);
        self.persist(&actions)?;

        debug!(%id, %kind, resource, queued = actions.len(), "Enqueued pending action");
        Ok(id)
    }

    /// Snapshot of the queue in insertion order. Never mutates storage;
    /// malformed persisted content is logged and reads as empty.
    pub fn list(&self) -> Vec<PendingAction> {
        self.load()
    }

    /// Remove the action with the given id, if present, and re-persist.
    pub fn remove(&self, id: Uuid) -> Result<(), StorageError> {
        let mut actions = self.load();
        let before = actions.len();
        actions.retain(|a| a.id != id);
        if actions.len() == before {
            debug!(%id, "Remove requested for action not in queue");
            return Ok(());
        }
        self.persist(&actions)
    }

    /// Record a failed delivery attempt: bump `retry_count` and store the
    /// error message. The action stays queued.
    pub fn record_failure(&self, id: Uuid, error: &str) -> Result<(), StorageError> {
        let mut actions = self.load();
        if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
            action.retry_count += 1;
            action.last_error = Some(error.to_string());
            debug!(%id, attempts = action.retry_count, "Recorded delivery failure");
            self.persist(&actions)?;
        }
        Ok(())
    }

    /// Number of queued actions. Cheap enough to poll for UI display.
    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued action (logout). Cached snapshots are untouched.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(QUEUE_KEY)
    }

    fn load(&self) -> Vec<PendingAction> {
        let raw = match self.storage.get(QUEUE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read pending queue, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "Malformed pending queue, treating as empty");
                Vec::new()
            }
        }
    }

    fn persist(&self, actions: &[PendingAction]) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(actions)
            .map_err(|e| StorageError::Unavailable(format!("queue serialization failed: {e}")))?;
        self.storage.set(QUEUE_KEY, &serialized)
    }
}

// ============================================================================
// Tests
// ============================================================================
