//! Sync ledger: the durable idempotency witness.
//!
//! One row per `(table_name, sync_version)` that the import engine has
//! fully processed. Rows are only ever inserted.

use rusqlite::{Connection, OptionalExtension, Result};
use serde::Serialize;

/// A single ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub table_name: String,
    pub sync_version: i64,
    /// Records actually inserted when the table was applied.
    pub record_count: i64,
    /// Unix milliseconds.
    pub applied_at: i64,
}

/// Ledger view over a connection.
pub struct SyncLedger<'a> {
    conn: &'a Connection,
}

impl<'a> SyncLedger<'a> {
    #[must_use]
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Whether `(table, version)` has already been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_applied(&self, table: &str, version: i64) -> Result<bool> {
        self.conn
            .prepare_cached(
                "SELECT 1 FROM sync_ledger WHERE table_name = ?1 AND sync_version = ?2",
            )?
            .exists(rusqlite::params![table, version])
    }

    /// Record that `(table, version)` has been applied.
    ///
    /// Returns `false` when an entry already existed. A concurrent import
    /// that got there first is not an error; the first entry stands.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails for any other reason.
    pub fn record(&self, table: &str, version: i64, record_count: usize) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO sync_ledger (table_name, sync_version, record_count, applied_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                table,
                version,
                i64::try_from(record_count).unwrap_or(i64::MAX),
                chrono::Utc::now().timestamp_millis()
            ],
        )?;
        Ok(changed == 1)
    }

    /// Fetch a single entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, table: &str, version: i64) -> Result<Option<LedgerEntry>> {
        self.conn
            .query_row(
                "SELECT table_name, sync_version, record_count, applied_at
                 FROM sync_ledger WHERE table_name = ?1 AND sync_version = ?2",
                rusqlite::params![table, version],
                map_entry,
            )
            .optional()
    }

    /// List entries, newest version first, optionally for one version.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, version: Option<i64>) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name, sync_version, record_count, applied_at
             FROM sync_ledger
             WHERE ?1 IS NULL OR sync_version = ?1
             ORDER BY sync_version DESC, id ASC",
        )?;
        let entries = stmt
            .query_map([version], map_entry)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn map_entry(row: &rusqlite::Row<'_>) -> Result<LedgerEntry> {
    Ok(LedgerEntry {
        table_name: row.get(0)?,
        sync_version: row.get(1)?,
        record_count: row.get(2)?,
        applied_at: row.get(3)?,
    })
}
