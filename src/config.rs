//! Engine configuration management.
//!
//! Holds the remote API location and the engine's tuning knobs (request
//! timeout, retry ceiling, cache TTL). Configuration is stored at
//! `~/.config/cropsync/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "cropsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
/// 30s tolerates slow rural links while still bounding how long one hung
/// request can stall a drain.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Delivery attempts before a queued action is dropped.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Consider cached snapshots stale after 1 hour.
/// Balances freshness with reducing unnecessary API calls for slowly-changing
/// farm data.
const DEFAULT_CACHE_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the farm-records server, e.g. `https://api.example.com`.
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub cache_ttl_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the default file-backed storage adapter.
    pub fn data_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Cache TTL as a chrono duration, for `CacheEntry::is_stale`.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_ttl_minutes)
    }
}

// ============================================================================
// Tests
// ============================================================================
