//! Snapshot export.
//!
//! Reads every row of each synced table inside one read transaction, so
//! the snapshot is consistent across tables. The export is a literal
//! mirror of table state: no filtering, ordering or transformation of row
//! content beyond mapping SQLite values to JSON.
//!
//! An optional allow-list narrows the export to specific tables, which
//! keeps the payload under downstream size limits when only part of the
//! data needs to move.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info};

use crate::storage::sqlite::{scan_table, SqliteStorage};
use crate::sync::schema::{self, TableSchema};
use crate::sync::types::{ExportResult, SnapshotPayload, SyncError, SyncResult};

/// Exporter for snapshot payloads.
pub struct Exporter<'a> {
    storage: &'a SqliteStorage,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(storage: &'a SqliteStorage) -> Self {
        Self { storage }
    }

    /// Export the allow-listed tables (all registry tables when `None`).
    ///
    /// Tables are read in dependency order regardless of allow-list order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTable` for a name not in the registry, or a database
    /// error. Either way no payload is produced.
    pub fn export(&self, tables: Option<&[String]>, version: i64) -> SyncResult<ExportResult> {
        let selected = select_tables(tables)?;

        let tx = self.storage.conn().unchecked_transaction()?;
        let mut data = BTreeMap::new();
        let mut counts_per_table = BTreeMap::new();

        for table in selected {
            let records = scan_table(&tx, table.name)?;
            debug!(table = table.name, count = records.len(), "Scanned table");
            counts_per_table.insert(table.name.to_string(), records.len());
            data.insert(table.name.to_string(), records);
        }
        // Read-only; nothing to commit
        tx.finish()?;

        let payload = SnapshotPayload {
            version,
            data,
            timestamp: Utc::now().to_rfc3339(),
        };
        info!(
            version,
            tables = counts_per_table.len(),
            records = payload.total_records(),
            "Export complete"
        );

        Ok(ExportResult {
            counts_per_table,
            payload,
        })
    }
}

/// Resolve an allow-list to registry descriptors, in dependency order.
fn select_tables(tables: Option<&[String]>) -> SyncResult<Vec<&'static TableSchema>> {
    let Some(names) = tables else {
        return Ok(schema::TABLES.iter().collect());
    };

    if let Some(unknown) = names.iter().find(|n| !schema::is_known(n)) {
        return Err(SyncError::UnknownTable(unknown.clone()));
    }

    Ok(schema::TABLES
        .iter()
        .filter(|t| names.iter().any(|n| n == t.name))
        .collect())
}
