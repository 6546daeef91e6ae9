//! Database schema definitions.
//!
//! The synced domain tables mirror the dashboard's production schema.
//! Table order in this file matches the foreign-key dependency order
//! used by the import engine.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The base SQL schema for a dashsync database.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Monitored Content
-- ====================

-- Keywords: terms the ingestion poller searches for
CREATE TABLE IF NOT EXISTS keywords (
    id TEXT PRIMARY KEY,
    term TEXT NOT NULL UNIQUE,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

-- Authors: accounts that published monitored content
CREATE TABLE IF NOT EXISTS authors (
    id TEXT PRIMARY KEY,
    platform TEXT NOT NULL,
    platform_id TEXT NOT NULL,
    handle TEXT NOT NULL,
    display_name TEXT,
    follower_count INTEGER DEFAULT 0,
    created_at INTEGER NOT NULL,
    UNIQUE(platform, platform_id)
);

CREATE INDEX IF NOT EXISTS idx_authors_handle ON authors(handle);

-- Content items: posts with their classification
CREATE TABLE IF NOT EXISTS content_items (
    id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    platform_id TEXT NOT NULL,
    body TEXT NOT NULL,
    url TEXT,
    posted_at INTEGER NOT NULL,
    classification TEXT,
    confidence REAL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE,
    UNIQUE(platform, platform_id)
);

CREATE INDEX IF NOT EXISTS idx_content_items_author ON content_items(author_id);
CREATE INDEX IF NOT EXISTS idx_content_items_posted ON content_items(posted_at DESC);

-- Engagement snapshots: point-in-time counters for a content item
CREATE TABLE IF NOT EXISTS engagement_snapshots (
    id TEXT PRIMARY KEY,
    content_item_id TEXT NOT NULL,
    likes INTEGER NOT NULL DEFAULT 0,
    shares INTEGER NOT NULL DEFAULT 0,
    replies INTEGER NOT NULL DEFAULT 0,
    views INTEGER,
    captured_at INTEGER NOT NULL,
    FOREIGN KEY (content_item_id) REFERENCES content_items(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_engagement_item ON engagement_snapshots(content_item_id, captured_at DESC);
"#;

/// Apply the schema to a database connection.
///
/// Sets pragmas, creates the base tables and runs pending migrations.
/// Safe to call on every open.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // In-memory databases silently ignore WAL and report "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in ["keywords", "authors", "content_items", "engagement_snapshots", "sync_ledger"] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);

        // Content item pointing at a missing author is rejected
        let result = conn.execute(
            "INSERT INTO content_items (id, author_id, platform, platform_id, body, posted_at, created_at)
             VALUES ('c1', 'missing', 'x', '1', 'hello', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
