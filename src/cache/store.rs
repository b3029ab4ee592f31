//! TTL- and owner-aware cache store over a storage adapter.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::StorageAdapter;

/// Prefix reserved for cache entries in on-device storage. `clear_all`
/// removes exactly the keys under this prefix and nothing else.
const CACHE_NAMESPACE: &str = "cropsync.cache.";

/// A cached snapshot plus the metadata needed to judge it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,

    /// When the snapshot was fetched.
    pub timestamp: DateTime<Utc>,

    /// The farmer the snapshot belongs to. Checked on every read.
    pub owner_id: String,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, owner_id: &str) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
            owner_id: owner_id.to_string(),
        }
    }

    /// Time elapsed since the snapshot was fetched.
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// Age as observed at `now`. Seam for deterministic staleness checks.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// True once the entry's age exceeds `ttl`. Strictly greater-than: an
    /// entry exactly `ttl` old is still fresh. Staleness never deletes the
    /// entry, it only flags it for the caller.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.is_stale_at(Utc::now(), ttl)
    }

    /// Staleness as observed at `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_at(now) > ttl
    }

    /// Human-readable age for the UI ("just now", "5m ago", "2h ago").
    pub fn age_display(&self) -> String {
        let minutes = self.age().num_minutes();
        if minutes < 1 {
            // Also covers clock skew (negative ages)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Per-user, per-key read cache. Caching is best-effort: storage failures
/// are logged and swallowed, never surfaced to the caller.
#[derive(Debug)]
pub struct CacheStore<S> {
    storage: Arc<S>,
}

impl<S> Clone for CacheStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: StorageAdapter> CacheStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn storage_key(key: &str, owner_id: &str) -> String {
        format!("{}{}_{}", CACHE_NAMESPACE, key, owner_id)
    }

    /// Cache `data` under `key` for `owner_id`, overwriting any previous
    /// snapshot. A storage failure (quota, I/O) leaves the old entry in
    /// place and is not reported - a failed cache write must never fail the
    /// fetch that produced the data.
    pub fn set<T: Serialize>(&self, key: &str, data: &T, owner_id: &str) {
        let entry = CacheEntry::new(data, owner_id);
        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.storage.set(&Self::storage_key(key, owner_id), &serialized) {
            warn!(key, owner = owner_id, error = %e, "Failed to persist cache entry");
        }
    }

    /// Fetch the cached snapshot for `key` scoped to `owner_id`.
    ///
    /// A stored entry whose owner does not match is purged and reported as
    /// absent - another account's data is never returned, not even stale.
    /// Malformed stored content also reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str, owner_id: &str) -> Option<CacheEntry<T>> {
        let storage_key = Self::storage_key(key, owner_id);
        let raw = match self.storage.get(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, owner = owner_id, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(key, error = %e, "Malformed cache entry, treating as miss");
                return None;
            }
        };

        if entry.owner_id != owner_id {
            warn!(key, owner = owner_id, stored_owner = %entry.owner_id,
                "Cache entry owner mismatch, purging");
            if let Err(e) = self.storage.remove(&storage_key) {
                warn!(key, error = %e, "Failed to purge mismatched cache entry");
            }
            return None;
        }

        Some(entry)
    }

    /// Remove the entry for `key`: just one owner's when `owner_id` is
    /// given, or every owner's copy of that key when it is `None`.
    pub fn clear(&self, key: &str, owner_id: Option<&str>) {
        match owner_id {
            Some(owner) => {
                if let Err(e) = self.storage.remove(&Self::storage_key(key, owner)) {
                    warn!(key, owner, error = %e, "Failed to clear cache entry");
                }
            }
            None => self.clear_key_all_owners(key),
        }
    }

    /// Remove every entry under the cache namespace. Queue state and any
    /// unrelated on-device storage are untouched.
    pub fn clear_all(&self) {
        self.remove_by_prefix(CACHE_NAMESPACE);
    }

    /// Remove `key`'s entry for every owner. The owner is the segment after
    /// the final `_` of the stored key (owner ids never contain `_`), so a
    /// longer cache key that merely extends `key` - `profile_summary` next
    /// to `profile` - is left alone.
    fn clear_key_all_owners(&self, key: &str) {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(key, error = %e, "Failed to enumerate cache keys");
                return;
            }
        };
        for storage_key in keys {
            let Some(scoped) = storage_key.strip_prefix(CACHE_NAMESPACE) else {
                continue;
            };
            let Some((base, _owner)) = scoped.rsplit_once('_') else {
                continue;
            };
            if base != key {
                continue;
            }
            if let Err(e) = self.storage.remove(&storage_key) {
                warn!(key = %storage_key, error = %e, "Failed to remove cache entry");
            }
        }
    }

    fn remove_by_prefix(&self, prefix: &str) {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix, error = %e, "Failed to enumerate cache keys");
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove cache entry");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
