//! SQLite storage layer for dashsync.
//!
//! Both ends of a sync use the same storage: the source environment reads
//! from it during export, the target environment writes into it during
//! import.
//!
//! # Submodules
//!
//! - [`ledger`] - Append-only sync ledger (idempotency witness)
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite storage and generic row access

pub mod ledger;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use ledger::{LedgerEntry, SyncLedger};
pub use sqlite::{is_row_level_error, Record, SqliteStorage};
