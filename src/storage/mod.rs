//! On-device key-value persistence behind an injectable adapter.
//!
//! The queue and cache never touch storage directly; they go through the
//! `StorageAdapter` trait so tests can substitute `MemoryStorage` for the
//! file-backed default. Adapters are synchronous: persistence is local and
//! small, and keeping it non-suspending means queue/cache mutations can
//! never interleave with a drain's network calls.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Capability the engine needs from on-device storage: string values by key,
/// plus key enumeration for namespace prefix scans.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every key currently stored, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}
