//! Pending mutations and the vocabulary describing them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What a queued mutation does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// The server-side resources the engine knows how to address.
///
/// `PendingAction::resource` stays a plain string so that records written by
/// a newer app version still deserialize; an unrecognized string fails only
/// the affected action at delivery time, never the whole drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    CropBatch,
    HealthScan,
    Advisory,
}

impl ResourceKind {
    /// REST collection segment for this resource, e.g. `crop-batches` in
    /// `POST /api/crop-batches`.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::CropBatch => "crop-batches",
            ResourceKind::HealthScan => "health-scans",
            ResourceKind::Advisory => "advisories",
        }
    }

    /// Singular form used in queued records, e.g. `crop-batch`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::CropBatch => "crop-batch",
            ResourceKind::HealthScan => "health-scan",
            ResourceKind::Advisory => "advisory",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crop-batch" => Ok(ResourceKind::CropBatch),
            "health-scan" => Ok(ResourceKind::HealthScan),
            "advisory" => Ok(ResourceKind::Advisory),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued, not-yet-delivered mutation.
///
/// Created when a write is issued while offline; mutated only by the
/// orchestrator (retry bookkeeping); removed on successful delivery or once
/// `retry_count` reaches the retry ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// Stable unique id for the action's lifetime.
    pub id: Uuid,

    /// Mutation verb.
    pub kind: ActionKind,

    /// Singular resource name, e.g. `crop-batch`.
    pub resource: String,

    /// Request body for create/update; for update/delete must carry the
    /// target resource's `id` field so the REST path can be built.
    pub payload: Value,

    /// Number of failed delivery attempts so far. Only ever increases.
    pub retry_count: u32,

    /// Message from the most recent failed attempt, if any.
    pub last_error: Option<String>,

    /// When the action was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(kind: ActionKind, resource: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            resource: resource.to_string(),
            payload,
            retry_count: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        }
    }

    /// The target resource id carried in the payload, if present.
    /// Required for update and delete paths.
    pub fn target_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }
}

// ============================================================================
// Tests
// ============================================================================
