//! Ledger command implementation.

use crate::error::Result;
use crate::storage::SyncLedger;
use chrono::{TimeZone, Utc};
use colored::Colorize;
use std::path::PathBuf;

/// List ledger entries, newest version first.
///
/// # Errors
///
/// Returns an error if the database isn't initialized or the query fails.
pub fn execute(db_path: Option<&PathBuf>, sync_version: Option<i64>, json: bool) -> Result<()> {
    let storage = super::open_storage(db_path)?;
    let entries = SyncLedger::new(storage.conn()).list(sync_version)?;

    if json {
        return super::print_json(&entries);
    }

    if entries.is_empty() {
        println!("{}", "No tables applied yet.".dimmed());
        return Ok(());
    }

    println!("{}", "Sync Ledger".bold().underline());
    let mut current = None;
    for entry in &entries {
        if current != Some(entry.sync_version) {
            println!();
            println!("{}", format!("Version {}", entry.sync_version).blue().bold());
            current = Some(entry.sync_version);
        }
        let applied = Utc
            .timestamp_millis_opt(entry.applied_at)
            .single()
            .map_or_else(|| entry.applied_at.to_string(), |t| t.to_rfc3339());
        println!(
            "  {:<22} {:>8} records  {}",
            entry.table_name,
            entry.record_count,
            applied.dimmed()
        );
    }
    Ok(())
}
