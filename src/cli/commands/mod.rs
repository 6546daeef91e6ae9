//! Command implementations.

pub mod completions;
pub mod export;
pub mod import;
pub mod init;
pub mod ledger;
pub mod status;
pub mod transport;
pub mod upload;
pub mod version;

use std::path::PathBuf;

use crate::config::{resolve_blob_dir, resolve_db_path, resolve_status_dir, SyncSettings};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::sync::{FsBlobStore, StatusTracker};

/// Open the database, failing if `init` hasn't created it yet.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;
    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    SqliteStorage::open(&db_path)
}

pub(crate) fn open_blob_store(blob_dir: Option<&PathBuf>) -> Result<FsBlobStore> {
    let dir = resolve_blob_dir(blob_dir.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine blob store directory".to_string()))?;
    Ok(FsBlobStore::open(&dir)?)
}

pub(crate) fn status_tracker(status_dir: Option<&PathBuf>, settings: &SyncSettings) -> Result<StatusTracker> {
    let dir = resolve_status_dir(status_dir.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine status directory".to_string()))?;
    Ok(StatusTracker::new(&dir, settings.status_ttl()))
}

/// Print a value as a single JSON line.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
