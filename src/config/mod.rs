//! Configuration management.
//!
//! Resolves where the database, blob store and status records live, and
//! loads optional tuning from `~/.dashsync/config.json`.
//!
//! Every path resolves the same way:
//! 1. Explicit CLI flag
//! 2. Environment variable (`DASHSYNC_DB`, `DASHSYNC_BLOB_DIR`, `DASHSYNC_STATUS_DIR`)
//! 3. Under the global `~/.dashsync/` directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{ImportOptions, DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_BATCH_SIZE, DEFAULT_STATUS_TTL};

/// Get the global dashsync directory (`~/.dashsync/`).
#[must_use]
pub fn global_dashsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".dashsync"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn resolve(explicit: Option<&Path>, var: &str, default: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path(var) {
        return Some(path);
    }
    global_dashsync_dir().map(|dir| default.iter().fold(dir, |acc, part| acc.join(part)))
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path` (the `--db` flag)
/// 2. `DASHSYNC_DB` environment variable
/// 3. `~/.dashsync/data/dashsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    resolve(explicit_path, "DASHSYNC_DB", &["data", "dashsync.db"])
}

/// Resolve the blob store root (`--blob-dir`, `DASHSYNC_BLOB_DIR`, `~/.dashsync/blobs`).
#[must_use]
pub fn resolve_blob_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve(explicit, "DASHSYNC_BLOB_DIR", &["blobs"])
}

/// Resolve the status record directory (`--status-dir`, `DASHSYNC_STATUS_DIR`, `~/.dashsync/status`).
#[must_use]
pub fn resolve_status_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve(explicit, "DASHSYNC_STATUS_DIR", &["status"])
}

/// Tunables read from `config.json`. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    /// Upload chunk size in bytes.
    pub chunk_size: usize,
    pub batch_size: usize,
    pub min_batch_size: usize,
    /// Status record retention in seconds.
    pub status_ttl_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            status_ttl_secs: DEFAULT_STATUS_TTL.as_secs(),
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            min_batch_size: self.min_batch_size,
        }
    }

    #[must_use]
    pub const fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    fn validate(self) -> Result<Self> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunkSize must be greater than zero".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batchSize must be greater than zero".to_string()));
        }
        if self.min_batch_size == 0 || self.min_batch_size > self.batch_size {
            return Err(Error::Config(format!(
                "minBatchSize must be between 1 and batchSize ({})",
                self.batch_size
            )));
        }
        Ok(self)
    }
}

/// Load settings from `~/.dashsync/config.json`, or defaults if absent.
///
/// # Errors
///
/// Returns `Config` if the file exists but is unreadable or invalid.
pub fn load_settings() -> Result<SyncSettings> {
    match global_dashsync_dir() {
        Some(dir) => load_settings_from(&dir.join("config.json")),
        None => Ok(SyncSettings::default()),
    }
}

/// Load settings from a specific file, or defaults if it doesn't exist.
///
/// # Errors
///
/// Returns `Config` if the file exists but is unreadable or invalid.
pub fn load_settings_from(path: &Path) -> Result<SyncSettings> {
    if !path.exists() {
        return Ok(SyncSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    let settings: SyncSettings = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    settings.validate()
}
