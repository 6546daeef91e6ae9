//! Sync status tracking.
//!
//! One small JSON file per sync key, overwritten atomically at each step of
//! an upload or import so a caller can poll progress from another process.
//! Records expire after a TTL (24 hours by default). A stale record is
//! deleted on read and reported as absent: absence means "unknown", never
//! "failed".
//!
//! Status is observational only. Nothing here is consulted for correctness,
//! so write failures are logged and swallowed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sync::file::atomic_write_private;
use crate::sync::transport::validate_key;
use crate::sync::types::{SyncResult, TableResult};

/// Default retention for status records: 24 hours.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub tables_processed: usize,
    pub total_tables: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_table: Option<String>,
    pub records_processed: usize,
}

/// Status record for one sync key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusRecord {
    pub sync_key: String,
    pub status: SyncState,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, TableResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Unix milliseconds of the last write; drives expiry.
    pub updated_at: i64,
}

impl SyncStatusRecord {
    #[must_use]
    pub fn new(sync_key: &str) -> Self {
        Self {
            sync_key: sync_key.to_string(),
            status: SyncState::Pending,
            progress: Progress::default(),
            results: None,
            error: None,
            started_at: None,
            completed_at: None,
            updated_at: now_millis(),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// File-backed status store with a TTL.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    dir: PathBuf,
    ttl: Duration,
}

impl StatusTracker {
    #[must_use]
    pub fn new(dir: &Path, ttl: Duration) -> Self {
        Self {
            dir: dir.to_path_buf(),
            ttl,
        }
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        validate_key(key).ok()?;
        Some(self.dir.join(format!("{key}.json")))
    }

    fn is_stale(&self, record: &SyncStatusRecord) -> bool {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_sub(record.updated_at) > ttl_ms
    }

    /// Read the status for `key`.
    ///
    /// Returns `None` if:
    /// - the key is invalid or has no record
    /// - the record is stale (it is removed)
    /// - the file is corrupted
    #[must_use]
    pub fn get(&self, key: &str) -> Option<SyncStatusRecord> {
        let path = self.path(key)?;
        let content = fs::read(&path).ok()?;
        let record: SyncStatusRecord = serde_json::from_slice(&content).ok()?;

        if self.is_stale(&record) {
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(record)
    }

    /// Overwrite the record for `record.sync_key`, refreshing its timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    pub fn put(&self, record: &SyncStatusRecord) -> SyncResult<()> {
        let mut record = record.clone();
        record.updated_at = now_millis();
        self.write(&record)
    }

    fn write(&self, record: &SyncStatusRecord) -> SyncResult<()> {
        validate_key(&record.sync_key)?;
        let path = self.dir.join(format!("{}.json", record.sync_key));
        atomic_write_private(&path, &serde_json::to_vec_pretty(record)?)
    }

    /// Read-modify-write; failures are logged, not returned.
    fn update(&self, key: &str, f: impl FnOnce(&mut SyncStatusRecord)) {
        let mut record = self.get(key).unwrap_or_else(|| SyncStatusRecord::new(key));
        f(&mut record);
        debug!(key, status = record.status.as_str(), "Status updated");
        if let Err(e) = self.put(&record) {
            warn!(key, error = %e, "Failed to write sync status");
        }
    }

    /// Upload accepted; import not started yet.
    pub fn mark_pending(&self, key: &str) {
        self.update(key, |r| {
            *r = SyncStatusRecord::new(key);
        });
    }

    /// Import started over `total_tables` tables.
    pub fn mark_processing(&self, key: &str, total_tables: usize) {
        self.update(key, |r| {
            r.status = SyncState::Processing;
            r.progress = Progress {
                total_tables,
                ..Progress::default()
            };
            r.results = None;
            r.error = None;
            r.started_at = Some(now_rfc3339());
            r.completed_at = None;
        });
    }

    /// A table is about to be imported.
    pub fn start_table(&self, key: &str, table: &str) {
        self.update(key, |r| r.progress.current_table = Some(table.to_string()));
    }

    /// One table finished. `current_table` keeps naming it until the next
    /// table starts.
    pub fn record_table(&self, key: &str, table: &str, records: usize) {
        self.update(key, |r| {
            r.progress.tables_processed += 1;
            r.progress.records_processed += records;
        });
        debug!(key, table, records, "Table progress recorded");
    }

    pub fn mark_completed(&self, key: &str, results: &BTreeMap<String, TableResult>) {
        self.update(key, |r| {
            r.status = SyncState::Completed;
            r.progress.current_table = None;
            r.results = Some(results.clone());
            r.completed_at = Some(now_rfc3339());
        });
    }

    pub fn mark_failed(&self, key: &str, error: &str, results: &BTreeMap<String, TableResult>) {
        self.update(key, |r| {
            r.status = SyncState::Failed;
            r.error = Some(error.to_string());
            r.results = Some(results.clone());
            r.completed_at = Some(now_rfc3339());
        });
    }

    /// Remove stale and corrupted records. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn purge_expired(&self) -> SyncResult<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let keep = fs::read(&path)
                .ok()
                .and_then(|bytes| serde_json::from_slice::<SyncStatusRecord>(&bytes).ok())
                .is_some_and(|record| !self.is_stale(&record));
            if !keep {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Print a status record to stdout in a human-readable format.
pub fn print_status(record: &SyncStatusRecord) {
    println!("{}", format!("Sync {}", record.sync_key).bold().underline());
    println!();

    let state = match record.status {
        SyncState::Pending => record.status.as_str().yellow(),
        SyncState::Processing => record.status.as_str().blue(),
        SyncState::Completed => record.status.as_str().green(),
        SyncState::Failed => record.status.as_str().red(),
    };
    println!("  Status:   {}", state.bold());

    let p = &record.progress;
    if p.total_tables > 0 {
        println!(
            "  Progress: {}/{} tables, {} records",
            p.tables_processed, p.total_tables, p.records_processed
        );
    }
    if let Some(table) = &p.current_table {
        println!("  Current:  {table}");
    }
    if let Some(started) = &record.started_at {
        println!("  Started:  {started}");
    }
    if let Some(completed) = &record.completed_at {
        println!("  Finished: {completed}");
    }
    if let Some(error) = &record.error {
        println!("  {}    {}", "Error:".red().bold(), error);
    }

    if let Some(results) = &record.results {
        println!();
        println!("{}", "Tables:".blue().bold());
        for (table, result) in results {
            if result.skipped {
                println!("  {table:<22} {}", "already applied".dimmed());
            } else {
                println!(
                    "  {table:<22} {}/{} inserted, {} conflicts, {} failed",
                    result.inserted, result.attempted, result.conflicts, result.failed
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> StatusTracker {
        StatusTracker::new(dir.path(), DEFAULT_STATUS_TTL)
    }

    #[test]
    fn test_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir);
        let key = "sync-1-abcdef01";

        tracker.mark_pending(key);
        assert_eq!(tracker.get(key).unwrap().status, SyncState::Pending);

        tracker.mark_processing(key, 2);
        tracker.start_table(key, "authors");
        let record = tracker.get(key).unwrap();
        assert_eq!(record.progress.current_table.as_deref(), Some("authors"));
        assert_eq!(record.progress.tables_processed, 0);

        tracker.record_table(key, "authors", 3);
        let record = tracker.get(key).unwrap();
        assert_eq!(record.status, SyncState::Processing);
        assert_eq!(record.progress.tables_processed, 1);
        assert_eq!(record.progress.total_tables, 2);
        assert_eq!(record.progress.current_table.as_deref(), Some("authors"));
        assert_eq!(record.progress.records_processed, 3);
        assert!(record.started_at.is_some());

        let mut results = BTreeMap::new();
        results.insert("authors".to_string(), TableResult::already_applied(3));
        tracker.start_table(key, "content_items");
        assert_eq!(
            tracker.get(key).unwrap().progress.current_table.as_deref(),
            Some("content_items")
        );
        tracker.record_table(key, "content_items", 0);
        tracker.mark_completed(key, &results);

        let record = tracker.get(key).unwrap();
        assert_eq!(record.status, SyncState::Completed);
        assert_eq!(record.progress.tables_processed, 2);
        assert!(record.results.unwrap()["authors"].skipped);
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_failed_keeps_error() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir);

        tracker.mark_processing("sync-x", 4);
        tracker.mark_failed("sync-x", "no such table: authors", &BTreeMap::new());

        let record = tracker.get("sync-x").unwrap();
        assert_eq!(record.status, SyncState::Failed);
        assert_eq!(record.error.as_deref(), Some("no such table: authors"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut record = SyncStatusRecord::new("sync-x");
        record.progress.tables_processed = 1;
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["syncKey"], "sync-x");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["progress"]["tablesProcessed"], 1);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_stale_record_is_removed_on_read() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir);

        let mut record = SyncStatusRecord::new("sync-old");
        record.updated_at -= 25 * 60 * 60 * 1000;
        tracker.write(&record).unwrap();

        assert!(tracker.get("sync-old").is_none());
        assert!(!temp_dir.path().join("sync-old.json").exists());
    }

    #[test]
    fn test_purge_expired() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir);

        tracker.mark_pending("sync-fresh");
        let mut old = SyncStatusRecord::new("sync-old");
        old.updated_at -= 25 * 60 * 60 * 1000;
        tracker.write(&old).unwrap();
        fs::write(temp_dir.path().join("sync-bad.json"), b"{not json").unwrap();

        assert_eq!(tracker.purge_expired().unwrap(), 2);
        assert!(tracker.get("sync-fresh").is_some());
    }

    #[test]
    fn test_missing_and_invalid_keys() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir);

        assert!(tracker.get("sync-none").is_none());
        assert!(tracker.get("../etc/passwd").is_none());
        assert!(tracker.put(&SyncStatusRecord::new("../x")).is_err());
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        // The status dir is a regular file, so every write fails
        let tracker = StatusTracker::new(&blocker, DEFAULT_STATUS_TTL);
        tracker.mark_pending("sync-x");
        assert!(tracker.get("sync-x").is_none());
    }
}
