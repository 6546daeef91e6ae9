//! Snapshot import.
//!
//! Applies a snapshot payload to the target store one table at a time, in
//! registry (dependency) order. Per table:
//!
//! 1. **Ledger gate**: skip if `(table, version)` is already recorded.
//! 2. **Normalization**: canonical column names, undeclared fields dropped.
//! 3. **Conflict filtering**: drop records whose natural key already exists
//!    in the store or earlier in the same payload.
//! 4. **Batched insert**: batches of `batch_size`; a batch that fails on row
//!    data is halved and retried down to `min_batch_size`, where it is
//!    skipped and reported.
//! 5. **Ledger write**: the table is recorded as applied.
//!
//! Tables are independent: a table-fatal error stops the run, but every
//! table ledgered before it stays applied, so the import can simply be run
//! again.

use std::collections::{HashSet, VecDeque};

use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::storage::sqlite::{is_row_level_error, json_to_sql, SqliteStorage};
use crate::storage::SyncLedger;
use crate::sync::blob::BlobStore;
use crate::sync::schema::{self, TableSchema};
use crate::sync::status::StatusTracker;
use crate::sync::transport::ChunkedTransport;
use crate::sync::types::{
    BatchFailure, ImportReport, Record, SnapshotPayload, SyncResult, TableResult,
};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MIN_BATCH_SIZE: usize = 1;

/// Batch sizing for inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub batch_size: usize,
    /// Batches at or below this size are skipped rather than split.
    pub min_batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
        }
    }
}

/// Importer for snapshot payloads.
pub struct Importer<'a> {
    storage: &'a mut SqliteStorage,
    options: ImportOptions,
    tracker: Option<(&'a StatusTracker, String)>,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(storage: &'a mut SqliteStorage) -> Self {
        Self {
            storage,
            options: ImportOptions::default(),
            tracker: None,
        }
    }

    /// Set batch sizing. Sizes are clamped to `1 <= min <= batch`.
    #[must_use]
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        self.options = ImportOptions {
            batch_size,
            min_batch_size: options.min_batch_size.clamp(1, batch_size),
        };
        self
    }

    /// Report progress for `sync_key` through `tracker`.
    #[must_use]
    pub fn with_tracker(mut self, tracker: &'a StatusTracker, sync_key: &str) -> Self {
        self.tracker = Some((tracker, sync_key.to_string()));
        self
    }

    /// Fetch the blob stored under `key`, decode it and import it.
    ///
    /// `version` defaults to the version carried in the payload.
    ///
    /// # Errors
    ///
    /// Returns `BlobNotFound` or `MalformedPayload` before the store is
    /// touched. Table failures are in the report, as for [`run`](Self::run).
    pub fn run_from_key<B: BlobStore + ?Sized>(
        &mut self,
        store: &B,
        key: &str,
        version: Option<i64>,
    ) -> SyncResult<ImportReport> {
        let payload = ChunkedTransport::new(store)
            .fetch(key)
            .and_then(|bytes| SnapshotPayload::from_slice(&bytes));

        let payload = match payload {
            Ok(p) => p,
            Err(e) => {
                if let Some((tracker, sync_key)) = &self.tracker {
                    tracker.mark_failed(sync_key, &e.to_string(), &Default::default());
                }
                return Err(e);
            }
        };

        let version = version.unwrap_or(payload.version);
        Ok(self.run(&payload, version))
    }

    /// Import `payload` under `version`.
    ///
    /// A table-fatal error comes back in the report: `success == false`,
    /// `aborted_at` naming the table, and every earlier table ledgered.
    pub fn run(&mut self, payload: &SnapshotPayload, version: i64) -> ImportReport {
        debug_assert_eq!(schema::check_dependency_order(schema::TABLES), Ok(()));

        let unknown_tables: Vec<String> = payload
            .validate_tables()
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in &unknown_tables {
            warn!(table = %name, "Skipping table not in the schema registry");
        }

        let present: Vec<&'static TableSchema> = schema::TABLES
            .iter()
            .filter(|t| payload.data.contains_key(t.name))
            .collect();

        let mut report = ImportReport {
            success: true,
            sync_version: version,
            unknown_tables,
            ..ImportReport::default()
        };

        if let Some((tracker, key)) = &self.tracker {
            tracker.mark_processing(key, present.len());
        }
        info!(version, tables = present.len(), "Import started");

        for table in present {
            let records = payload.data.get(table.name).map_or(&[][..], Vec::as_slice);
            if let Some((tracker, key)) = &self.tracker {
                tracker.start_table(key, table.name);
            }

            match self.import_table(table, records, version) {
                Ok(result) => {
                    if let Some((tracker, key)) = &self.tracker {
                        tracker.record_table(key, table.name, result.inserted);
                    }
                    report.tables.insert(table.name.to_string(), result);
                }
                Err(e) => {
                    error!(table = table.name, error = %e, "Import aborted");
                    report.success = false;
                    report.aborted_at = Some(table.name.to_string());
                    report.error = Some(e.to_string());
                    if let Some((tracker, key)) = &self.tracker {
                        tracker.mark_failed(key, &e.to_string(), &report.tables);
                    }
                    return report;
                }
            }
        }

        if let Some((tracker, key)) = &self.tracker {
            tracker.mark_completed(key, &report.tables);
        }
        info!(
            version,
            inserted = report.total_inserted(),
            attempted = report.total_attempted(),
            "Import complete"
        );
        report
    }

    fn import_table(
        &mut self,
        table: &TableSchema,
        records: &[Record],
        version: i64,
    ) -> SyncResult<TableResult> {
        let attempted = records.len();

        if SyncLedger::new(self.storage.conn()).is_applied(table.name, version)? {
            debug!(table = table.name, version, "Already applied, skipping");
            return Ok(TableResult::already_applied(attempted));
        }

        let mut rows = records.to_vec();
        table.normalize_all(&mut rows);

        let (rows, conflicts) = self.filter_conflicts(table, rows)?;
        let (inserted, failures) = self.insert_degrading(table, &rows)?;
        let failed = failures.iter().map(|f| f.len).sum();

        let recorded = SyncLedger::new(self.storage.conn()).record(table.name, version, inserted)?;
        if !recorded {
            debug!(table = table.name, version, "Ledger entry already written by another import");
        }

        info!(
            table = table.name,
            attempted, inserted, conflicts, failed, "Table imported"
        );
        Ok(TableResult {
            attempted,
            inserted,
            skipped: false,
            conflicts,
            failed,
            failures,
        })
    }

    /// Drop records whose natural key exists in the store or earlier in
    /// `rows`. Records missing a key column can't be matched and are kept.
    fn filter_conflicts(
        &self,
        table: &TableSchema,
        rows: Vec<Record>,
    ) -> SyncResult<(Vec<Record>, usize)> {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(rows.len());
        let mut conflicts = 0;

        for row in rows {
            let Some(key) = natural_key(table, &row) else {
                kept.push(row);
                continue;
            };

            let values: Vec<SqlValue> = key.iter().map(json_to_sql).collect();
            let fingerprint: Vec<String> = values.iter().map(key_text).collect();
            if seen.contains(&fingerprint) {
                conflicts += 1;
                continue;
            }

            if self.storage.key_exists(table.name, table.conflict_key, &values)? {
                conflicts += 1;
                continue;
            }

            seen.insert(fingerprint);
            kept.push(row);
        }

        if conflicts > 0 {
            debug!(table = table.name, conflicts, "Filtered existing records");
        }
        Ok((kept, conflicts))
    }

    /// Insert `rows` in batches, halving any batch that fails on row data.
    ///
    /// Batches are processed strictly in order. Returns the inserted count
    /// and the batches skipped at minimum size.
    fn insert_degrading(
        &mut self,
        table: &TableSchema,
        rows: &[Record],
    ) -> SyncResult<(usize, Vec<BatchFailure>)> {
        let ImportOptions {
            batch_size,
            min_batch_size,
        } = self.options;

        let mut pending: VecDeque<(usize, usize)> = (0..rows.len())
            .step_by(batch_size)
            .map(|offset| (offset, batch_size.min(rows.len() - offset)))
            .collect();
        let mut inserted = 0;
        let mut failures = Vec::new();

        while let Some((offset, len)) = pending.pop_front() {
            let batch = &rows[offset..offset + len];
            match self.storage.insert_batch(table.name, batch) {
                Ok(n) => inserted += n,
                Err(e) if is_row_level_error(&e) => {
                    if len > min_batch_size {
                        let left = len / 2;
                        debug!(table = table.name, offset, len, "Batch failed, splitting");
                        pending.push_front((offset + left, len - left));
                        pending.push_front((offset, left));
                    } else {
                        warn!(table = table.name, offset, len, error = %e, "Skipping batch");
                        failures.push(BatchFailure {
                            offset,
                            len,
                            error: e.to_string(),
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((inserted, failures))
    }
}

/// Natural key values for a record, or `None` if any are absent or null.
fn natural_key(table: &TableSchema, row: &Record) -> Option<Vec<Value>> {
    table
        .conflict_key
        .iter()
        .map(|column| row.get(*column).filter(|v| !v.is_null()).cloned())
        .collect()
}

/// A key value as a TEXT key column stores it, so `"100"` and `100` match.
fn key_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::blob::MemoryBlobStore;
    use crate::sync::status::{SyncState, DEFAULT_STATUS_TTL};
    use crate::sync::types::SyncError;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn author(id: &str, platform_id: &str) -> Record {
        record(json!({
            "id": id,
            "platform": "x",
            "platformId": platform_id,
            "handle": format!("@{id}"),
            "createdAt": 1000,
        }))
    }

    fn item(id: &str, author_id: &str) -> Record {
        record(json!({
            "id": id,
            "author_id": author_id,
            "platform": "x",
            "platform_id": format!("p-{id}"),
            "body": "text",
            "posted_at": 2000,
            "created_at": 2000,
        }))
    }

    fn keyword(id: &str, term: Option<&str>) -> Record {
        record(json!({"id": id, "term": term, "is_active": 1, "created_at": 1}))
    }

    fn payload(version: i64, tables: Vec<(&str, Vec<Record>)>) -> SnapshotPayload {
        SnapshotPayload {
            version,
            data: tables
                .into_iter()
                .map(|(name, rows)| (name.to_string(), rows))
                .collect::<BTreeMap<_, _>>(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_import_applies_in_dependency_order() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        // Dependent table listed first
        let snapshot = payload(
            1,
            vec![
                ("content_items", vec![item("c1", "a1"), item("c2", "a1")]),
                ("authors", vec![author("a1", "100")]),
            ],
        );

        let report = Importer::new(&mut storage).run(&snapshot, 1);
        assert!(report.success);
        assert_eq!(report.tables["authors"].inserted, 1);
        assert_eq!(report.tables["content_items"].inserted, 2);

        let ledger = SyncLedger::new(storage.conn()).list(Some(1)).unwrap();
        let order: Vec<&str> = ledger.iter().map(|e| e.table_name.as_str()).collect();
        assert_eq!(order, ["authors", "content_items"]);
    }

    #[test]
    fn test_rerun_same_version_is_noop() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let snapshot = payload(3, vec![("authors", vec![author("a1", "100"), author("a2", "200")])]);

        Importer::new(&mut storage).run(&snapshot, 3);
        let report = Importer::new(&mut storage).run(&snapshot, 3);

        let authors = &report.tables["authors"];
        assert!(authors.skipped);
        assert_eq!(authors.inserted, 0);
        assert_eq!(authors.attempted, 2);
        assert_eq!(storage.count_rows("authors").unwrap(), 2);
        assert_eq!(
            SyncLedger::new(storage.conn()).get("authors", 3).unwrap().unwrap().record_count,
            2
        );
    }

    #[test]
    fn test_conflicting_keys_across_versions() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let first = payload(1, vec![("authors", vec![author("a1", "100")])]);
        Importer::new(&mut storage).run(&first, 1);

        // Same natural key under a new id and version
        let second = payload(2, vec![("authors", vec![author("a9", "100"), author("a2", "200")])]);
        let report = Importer::new(&mut storage).run(&second, 2);

        let authors = &report.tables["authors"];
        assert!(!authors.skipped);
        assert_eq!(authors.conflicts, 1);
        assert_eq!(authors.inserted, 1);
        assert_eq!(storage.count_rows("authors").unwrap(), 2);

        let ids: Vec<Value> = storage
            .scan_table("authors")
            .unwrap()
            .into_iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, [json!("a1"), json!("a2")]);
    }

    #[test]
    fn test_duplicates_within_payload_first_wins() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let snapshot = payload(1, vec![("authors", vec![author("a1", "100"), author("a2", "100")])]);

        let report = Importer::new(&mut storage).run(&snapshot, 1);
        assert_eq!(report.tables["authors"].conflicts, 1);
        assert_eq!(storage.scan_table("authors").unwrap()[0]["id"], json!("a1"));
    }

    #[test]
    fn test_payload_duplicates_match_across_json_types() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut numeric = author("a2", "100");
        numeric.insert("platformId".to_string(), json!(100));
        let snapshot = payload(1, vec![("authors", vec![author("a1", "100"), numeric])]);

        let report = Importer::new(&mut storage).run(&snapshot, 1);
        let authors = &report.tables["authors"];
        assert_eq!(authors.conflicts, 1);
        assert_eq!(authors.inserted, 1);
        assert_eq!(authors.failed, 0);
        assert_eq!(storage.scan_table("authors").unwrap()[0]["id"], json!("a1"));
    }

    #[test]
    fn test_key_text() {
        assert_eq!(key_text(&SqlValue::Integer(100)), "100");
        assert_eq!(key_text(&SqlValue::Text("100".into())), "100");
        assert_eq!(key_text(&SqlValue::Blob(vec![0xab, 0x01])), "ab01");
    }

    #[test]
    fn test_one_bad_record_in_a_hundred() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut rows: Vec<Record> = (0..100)
            .map(|i| keyword(&format!("k{i}"), Some(&format!("term-{i}"))))
            .collect();
        rows[37] = keyword("k37", None);

        let report = Importer::new(&mut storage)
            .run(&payload(1, vec![("keywords", rows)]), 1);

        let keywords = &report.tables["keywords"];
        assert!(report.success);
        assert_eq!(keywords.inserted, 99);
        assert_eq!(keywords.failed, 1);
        assert_eq!(keywords.failures.len(), 1);
        assert_eq!(keywords.failures[0].offset, 37);
        assert_eq!(keywords.failures[0].len, 1);
        assert!(keywords.failures[0].error.contains("NOT NULL"));
        assert_eq!(storage.count_rows("keywords").unwrap(), 99);
    }

    #[test]
    fn test_min_batch_size_skips_whole_sub_batch() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut rows: Vec<Record> = (0..8)
            .map(|i| keyword(&format!("k{i}"), Some(&format!("t{i}"))))
            .collect();
        rows[5] = keyword("k5", None);

        let report = Importer::new(&mut storage)
            .with_options(ImportOptions {
                batch_size: 8,
                min_batch_size: 2,
            })
            .run(&payload(1, vec![("keywords", rows)]), 1);

        // 8 -> 4 + 4 -> the failing 4 splits into 2 + 2 -> [4,5] skipped
        let keywords = &report.tables["keywords"];
        assert_eq!(keywords.inserted, 6);
        assert_eq!(keywords.failures.len(), 1);
        assert_eq!((keywords.failures[0].offset, keywords.failures[0].len), (4, 2));
    }

    #[test]
    fn test_missing_parent_is_row_level() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let snapshot = payload(
            1,
            vec![
                ("authors", vec![author("a1", "100")]),
                ("content_items", vec![item("c1", "a1"), item("c2", "ghost")]),
            ],
        );

        let report = Importer::new(&mut storage).run(&snapshot, 1);
        assert!(report.success);
        assert_eq!(report.tables["content_items"].inserted, 1);
        assert_eq!(report.tables["content_items"].failed, 1);
    }

    #[test]
    fn test_fatal_error_keeps_earlier_tables() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .conn()
            .execute_batch("DROP TABLE engagement_snapshots")
            .unwrap();

        let snapshot = payload(
            5,
            vec![
                ("authors", vec![author("a1", "100")]),
                ("content_items", vec![item("c1", "a1")]),
                (
                    "engagement_snapshots",
                    vec![record(json!({"id": "e1", "content_item_id": "c1", "captured_at": 1}))],
                ),
            ],
        );

        let report = Importer::new(&mut storage).run(&snapshot, 5);
        assert!(!report.success);
        assert_eq!(report.aborted_at.as_deref(), Some("engagement_snapshots"));
        assert!(report.error.is_some());
        assert!(!report.tables.contains_key("engagement_snapshots"));

        let ledger = SyncLedger::new(storage.conn());
        assert!(ledger.is_applied("authors", 5).unwrap());
        assert!(ledger.is_applied("content_items", 5).unwrap());
        assert!(!ledger.is_applied("engagement_snapshots", 5).unwrap());
    }

    #[test]
    fn test_rerun_after_fatal_error_resumes() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let ddl: String = storage
            .conn()
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'engagement_snapshots'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        storage
            .conn()
            .execute_batch("DROP TABLE engagement_snapshots")
            .unwrap();

        let snapshot = payload(
            5,
            vec![
                ("authors", vec![author("a1", "100")]),
                ("content_items", vec![item("c1", "a1")]),
                (
                    "engagement_snapshots",
                    vec![record(json!({"id": "e1", "content_item_id": "c1", "captured_at": 1}))],
                ),
            ],
        );
        assert!(!Importer::new(&mut storage).run(&snapshot, 5).success);

        storage.conn().execute_batch(&ddl).unwrap();
        let report = Importer::new(&mut storage).run(&snapshot, 5);

        assert!(report.success);
        assert!(report.aborted_at.is_none());
        assert!(report.tables["authors"].skipped);
        assert!(report.tables["content_items"].skipped);
        let snapshots = &report.tables["engagement_snapshots"];
        assert!(!snapshots.skipped);
        assert_eq!(snapshots.inserted, 1);
        assert_eq!(storage.count_rows("authors").unwrap(), 1);
        assert_eq!(storage.count_rows("engagement_snapshots").unwrap(), 1);
        assert!(SyncLedger::new(storage.conn()).is_applied("engagement_snapshots", 5).unwrap());
    }

    #[test]
    fn test_tracker_names_table_in_progress() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = StatusTracker::new(temp_dir.path(), DEFAULT_STATUS_TTL);
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .conn()
            .execute_batch("DROP TABLE content_items")
            .unwrap();

        let snapshot = payload(
            2,
            vec![
                ("authors", vec![author("a1", "100")]),
                ("content_items", vec![item("c1", "a1")]),
            ],
        );
        let report = Importer::new(&mut storage)
            .with_tracker(&tracker, "sync-2-0000abcd")
            .run(&snapshot, 2);
        assert_eq!(report.aborted_at.as_deref(), Some("content_items"));

        let status = tracker.get("sync-2-0000abcd").unwrap();
        assert_eq!(status.status, SyncState::Failed);
        assert_eq!(status.progress.current_table.as_deref(), Some("content_items"));
        assert_eq!(status.progress.tables_processed, 1);
    }

    #[test]
    fn test_unknown_tables_are_reported() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let snapshot = payload(
            1,
            vec![
                ("users", vec![record(json!({"id": "u1"}))]),
                ("authors", vec![author("a1", "100")]),
            ],
        );

        let report = Importer::new(&mut storage).run(&snapshot, 1);
        assert!(report.success);
        assert_eq!(report.unknown_tables, ["users"]);
        assert!(!report.tables.contains_key("users"));
    }

    #[test]
    fn test_run_from_key_with_tracker() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = StatusTracker::new(temp_dir.path(), DEFAULT_STATUS_TTL);
        let store = MemoryBlobStore::new();

        let snapshot = payload(9, vec![("authors", vec![author("a1", "100")])]);
        let bytes = snapshot.to_bytes().unwrap();
        let done = ChunkedTransport::new(&store)
            .with_chunk_size(16)
            .with_tracker(&tracker)
            .upload_payload(&bytes, None)
            .unwrap();
        assert_eq!(tracker.get(&done.sync_key).unwrap().status, SyncState::Pending);

        let mut storage = SqliteStorage::open_memory().unwrap();
        let report = Importer::new(&mut storage)
            .with_tracker(&tracker, &done.sync_key)
            .run_from_key(&store, &done.sync_key, None)
            .unwrap();
        assert_eq!(report.sync_version, 9);
        assert_eq!(report.total_inserted(), 1);

        let status = tracker.get(&done.sync_key).unwrap();
        assert_eq!(status.status, SyncState::Completed);
        assert_eq!(status.progress.tables_processed, 1);
        assert_eq!(status.progress.records_processed, 1);
        assert_eq!(status.results.unwrap()["authors"].inserted, 1);
    }

    #[test]
    fn test_malformed_blob_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = StatusTracker::new(temp_dir.path(), DEFAULT_STATUS_TTL);
        let store = MemoryBlobStore::new();
        let done = ChunkedTransport::new(&store)
            .upload_payload(br#"{"version": 1, "rows": []}"#, Some("sync-bad"))
            .unwrap();

        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = Importer::new(&mut storage)
            .with_tracker(&tracker, &done.sync_key)
            .run_from_key(&store, &done.sync_key, None)
            .unwrap_err();

        assert!(matches!(err, SyncError::MalformedPayload(_)));
        assert!(SyncLedger::new(storage.conn()).list(None).unwrap().is_empty());
        assert_eq!(tracker.get("sync-bad").unwrap().status, SyncState::Failed);
    }

    #[test]
    fn test_missing_blob() {
        let store = MemoryBlobStore::new();
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = Importer::new(&mut storage)
            .run_from_key(&store, "sync-nothing", Some(1))
            .unwrap_err();
        assert!(matches!(err, SyncError::BlobNotFound(_)));
    }

    /// Export from one store, move through the transport, import into another.
    #[test]
    fn test_end_to_end_between_stores() {
        let mut source = SqliteStorage::open_memory().unwrap();
        let seed = payload(
            1,
            vec![
                ("keywords", vec![keyword("k1", Some("rust"))]),
                ("authors", vec![author("a1", "100")]),
                ("content_items", vec![item("c1", "a1")]),
            ],
        );
        Importer::new(&mut source).run(&seed, 1);

        let exported = crate::sync::Exporter::new(&source).export(None, 2).unwrap();
        let store = MemoryBlobStore::new();
        let done = ChunkedTransport::new(&store)
            .with_chunk_size(64)
            .upload_payload(&exported.payload.to_bytes().unwrap(), None)
            .unwrap();

        let mut target = SqliteStorage::open_memory().unwrap();
        let report = Importer::new(&mut target)
            .run_from_key(&store, &done.sync_key, None)
            .unwrap();

        assert!(report.success);
        assert_eq!(report.sync_version, 2);
        for table in ["keywords", "authors", "content_items"] {
            assert_eq!(
                target.scan_table(table).unwrap(),
                source.scan_table(table).unwrap(),
                "{table}"
            );
        }
    }
}
