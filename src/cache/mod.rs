//! Owner-scoped read cache for offline fallback.
//!
//! Every successful read-through fetch overwrites the cached snapshot for
//! that key; when the network is down, consumers fall back to the snapshot
//! and can check `CacheEntry::is_stale` against their TTL. Entries are
//! scoped to the farmer who fetched them so two accounts on one device can
//! never see each other's data.

pub mod store;

pub use store::{CacheEntry, CacheStore};
