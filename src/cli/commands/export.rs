//! Export command implementation.

use crate::error::Result;
use crate::sync::{file_size, write_payload, Exporter};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;

/// Export a snapshot.
///
/// Without `--out` the payload itself goes to stdout so it can be piped
/// straight into `upload` on another host.
///
/// # Errors
///
/// Returns an error if the database isn't initialized, a table name is
/// unknown, or the payload cannot be written.
pub fn execute(
    db_path: Option<&PathBuf>,
    tables: &[String],
    sync_version: Option<i64>,
    out: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let storage = super::open_storage(db_path)?;
    let version = sync_version.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let allow_list = (!tables.is_empty()).then_some(tables);

    let result = Exporter::new(&storage).export(allow_list, version)?;

    let Some(out) = out else {
        let bytes = result.payload.to_bytes()?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes)?;
        writeln!(stdout)?;
        return Ok(());
    };

    write_payload(out, &result.payload)?;

    if json {
        return super::print_json(&serde_json::json!({
            "success": true,
            "syncVersion": version,
            "path": out.display().to_string(),
            "countsPerTable": result.counts_per_table,
        }));
    }

    println!("{}", format!("Exported sync version {version}").green());
    for (table, count) in &result.counts_per_table {
        println!("  {table:<22} {count}");
    }
    println!();
    println!("  Total: {} records", result.payload.total_records());
    println!("  Location: {} ({} bytes)", out.display(), file_size(out));
    Ok(())
}
