//! Data models for the sync engine.
//!
//! This module contains the structures shared across the queue, the
//! orchestrator and the connectivity glue:
//!
//! - `PendingAction`: a queued, not-yet-delivered mutation
//! - `ActionKind`, `ResourceKind`: what the mutation does and to what
//! - `SyncStatus`: transient per-drain state broadcast to subscribers
//! - `DrainReport`, `ActionOutcome`: what a drain accomplished

pub mod action;
pub mod status;

pub use action::{ActionKind, PendingAction, ResourceKind};
pub use status::{ActionOutcome, DrainReport, SyncStatus};
