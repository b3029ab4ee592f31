//! The sync orchestrator: drains the pending queue against the remote API.
//!
//! One drain at a time (single-flight), strict FIFO, bounded retry. Status
//! transitions (`Syncing`, then `Complete` or `Error`) are broadcast to
//! registered listeners for the duration of each run.

pub mod orchestrator;

pub use orchestrator::{SubscriptionId, SyncOrchestrator};
