//! SQLite storage implementation.
//!
//! The sync subsystem treats tables generically: rows travel as JSON
//! records keyed by column name. Table and column names always come from
//! the static schema registry and are quoted before being spliced into SQL.

use crate::error::Result;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, Transaction};
use serde_json::{Map, Number, Value};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::storage::schema::apply_schema;

/// One table row as a flat mapping from column name to value.
pub type Record = Map<String, Value>;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // ==================
    // Generic table access
    // ==================

    /// Check whether a table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
            .exists([table])?)
    }

    /// Count rows in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table doesn't exist or the query fails.
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Read every row of a table.
    ///
    /// Rows come back in rowid order with column values mapped to JSON
    /// as-is. No filtering or transformation is applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the table doesn't exist or the query fails.
    pub fn scan_table(&self, table: &str) -> Result<Vec<Record>> {
        Ok(scan_table(&self.conn, table)?)
    }

    /// Check whether a row with the given key values already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn key_exists(&self, table: &str, columns: &[&str], values: &[SqlValue]) -> Result<bool> {
        let mut sql = format!("SELECT 1 FROM {} WHERE ", quote_ident(table));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            let _ = write!(sql, "{} = ?{}", quote_ident(column), i + 1);
        }
        sql.push_str(" LIMIT 1");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.exists(rusqlite::params_from_iter(values.iter()))?)
    }

    /// Insert a batch of records in a single transaction.
    ///
    /// Each record is inserted with exactly the columns it carries, so
    /// column defaults apply to absent fields. If any row fails the whole
    /// batch is rolled back and the raw SQLite error is returned, leaving
    /// classification to the caller.
    ///
    /// # Errors
    ///
    /// Returns the first row error, or a commit failure.
    pub fn insert_batch(&mut self, table: &str, rows: &[Record]) -> rusqlite::Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        for row in rows {
            insert_row(&tx, table, row)?;
        }

        tx.commit()?;
        Ok(rows.len())
    }
}

/// Quote an SQL identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Full-table scan on any connection (also used inside read transactions).
pub(crate) fn scan_table(conn: &Connection, table: &str) -> rusqlite::Result<Vec<Record>> {
    let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

    let rows = stmt.query_map([], |row| {
        let mut record = Record::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), sql_to_json(row.get_ref(i)?));
        }
        Ok(record)
    })?;

    let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn insert_row(tx: &Transaction, table: &str, row: &Record) -> rusqlite::Result<()> {
    if row.is_empty() {
        let sql = format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
        tx.execute(&sql, [])?;
        return Ok(());
    }

    let columns: Vec<String> = row.keys().map(|k| quote_ident(k)).collect();
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );

    let values: Vec<SqlValue> = row.values().map(json_to_sql).collect();
    let mut stmt = tx.prepare_cached(&sql)?;
    stmt.execute(rusqlite::params_from_iter(values.iter()))?;
    Ok(())
}

/// Whether an insert error is caused by the row data itself.
///
/// Row-level errors (constraint violations, type mismatches, values that
/// can't be bound) are contained by batch degradation. Anything else, such
/// as a missing table or column, I/O failure or lock timeout, means the
/// table cannot be processed at all.
#[must_use]
pub fn is_row_level_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch | ErrorCode::TooBig
        ),
        rusqlite::Error::ToSqlConversionFailure(_)
        | rusqlite::Error::IntegralValueOutOfRange(_, _)
        | rusqlite::Error::InvalidParameterCount(_, _) => true,
        _ => false,
    }
}

/// Convert a JSON value into an SQLite value.
///
/// Arrays and objects are stored as their JSON text.
#[must_use]
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Convert an SQLite value into JSON.
///
/// BLOBs are rendered as lowercase hex; non-finite REALs become null.
#[must_use]
pub fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => {
            let mut hex = String::with_capacity(b.len() * 2);
            for byte in b {
                let _ = write!(hex, "{byte:02x}");
            }
            Value::String(hex)
        }
    }
}
