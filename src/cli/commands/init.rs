//! Initialize dashsync storage.
//!
//! Creates the database (schema and migrations applied on open), the blob
//! store layout and the status directory. Each environment taking part in a
//! sync runs this once.

use crate::config::{resolve_blob_dir, resolve_db_path, resolve_status_dir};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::sync::FsBlobStore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitOutput {
    database: PathBuf,
    blob_dir: PathBuf,
    status_dir: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if any directory or the database cannot be created.
pub fn execute(
    db_path: Option<&PathBuf>,
    blob_dir: Option<&PathBuf>,
    status_dir: Option<&PathBuf>,
    force: bool,
    json: bool,
) -> Result<()> {
    let unresolved = || Error::Config("Could not determine the dashsync directory".to_string());
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(unresolved)?;
    let blob_dir = resolve_blob_dir(blob_dir.map(PathBuf::as_path)).ok_or_else(unresolved)?;
    let status_dir = resolve_status_dir(status_dir.map(PathBuf::as_path)).ok_or_else(unresolved)?;

    if db_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    SqliteStorage::open(&db_path)?;
    FsBlobStore::open(&blob_dir)?;
    fs::create_dir_all(&status_dir)?;

    if json {
        return super::print_json(&InitOutput {
            database: db_path,
            blob_dir,
            status_dir,
        });
    }

    println!("Initialized dashsync");
    print_path("Database", &db_path);
    print_path("Blobs", &blob_dir);
    print_path("Status", &status_dir);
    Ok(())
}

fn print_path(label: &str, path: &Path) {
    println!("  {:<9} {}", format!("{label}:"), path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(temp: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
        (
            temp.path().join("data").join("dashsync.db"),
            temp.path().join("blobs"),
            temp.path().join("status"),
        )
    }

    #[test]
    fn test_init_creates_everything() {
        let temp_dir = TempDir::new().unwrap();
        let (db, blobs, status) = paths(&temp_dir);

        execute(Some(&db), Some(&blobs), Some(&status), false, true).unwrap();

        assert!(db.exists());
        assert!(blobs.join("objects").is_dir());
        assert!(blobs.join("uploads").is_dir());
        assert!(status.is_dir());

        let storage = SqliteStorage::open(&db).unwrap();
        assert!(storage.table_exists("sync_ledger").unwrap());
    }

    #[test]
    fn test_init_twice_requires_force() {
        let temp_dir = TempDir::new().unwrap();
        let (db, blobs, status) = paths(&temp_dir);

        execute(Some(&db), Some(&blobs), Some(&status), false, true).unwrap();
        let result = execute(Some(&db), Some(&blobs), Some(&status), false, true);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));

        execute(Some(&db), Some(&blobs), Some(&status), true, true).unwrap();
    }
}
