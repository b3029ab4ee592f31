//! File-backed storage adapter: one file per key under a directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{StorageAdapter, StorageError};

/// Extension for stored entries so the directory can host unrelated files
/// (logs, lockfiles) without them showing up in `keys()`.
const ENTRY_EXTENSION: &str = "kv";

/// Stores each key as `<dir>/<key>.kv`.
///
/// Keys are sanitised for the filesystem: any character outside
/// `[A-Za-z0-9._-]` becomes `-`. The engine's own namespaces only use safe
/// characters, so sanitised keys round-trip through `keys()` unchanged.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create an adapter rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.dir.join(format!("{}.{}", safe, ENTRY_EXTENSION))
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            return None;
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        fs::write(&path, value)?;
        debug!(key, bytes = value.len(), "Persisted storage entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(key) = Self::key_from_path(&entry.path()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

// ============================================================================
// Tests
// ============================================================================
