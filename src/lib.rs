//! Cropsync - offline sync and cache engine for farm record apps.
//!
//! Smallholder farmers record crop batches and disease scans from areas with
//! unreliable connectivity. Mutations made while offline are parked in a
//! persisted queue and delivered to the server in the order they were made
//! once the network returns; reads fall back to a locally cached snapshot
//! that callers can check for staleness.
//!
//! The engine is built from four pieces:
//!
//! - [`queue::PendingQueue`]: a persisted FIFO of not-yet-delivered mutations
//! - [`sync::SyncOrchestrator`]: drains the queue against the REST API,
//!   single-flight guarded, with bounded retry
//! - [`cache::CacheStore`]: an owner-scoped, TTL-aware read cache
//! - [`connectivity`]: the online/offline signal and the auto-sync glue that
//!   kicks off a drain when the connection comes back
//!
//! All persistence goes through the [`storage::StorageAdapter`] trait so
//! tests (and platforms without a filesystem) can substitute an in-memory
//! adapter for the default file-backed one.

pub mod api;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod models;
pub mod queue;
pub mod storage;
pub mod sync;

pub use api::{ActionTransport, ApiClient, ApiError};
pub use cache::{CacheEntry, CacheStore};
pub use config::EngineConfig;
pub use connectivity::{AutoSyncController, ConnectivityMonitor};
pub use models::{
    ActionKind, ActionOutcome, DrainReport, PendingAction, ResourceKind, SyncStatus,
};
pub use queue::PendingQueue;
pub use storage::{FileStorage, MemoryStorage, StorageAdapter, StorageError};
pub use sync::{SubscriptionId, SyncOrchestrator};
