//! Import command implementation.

use crate::cli::ImportArgs;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::sync::{read_payload, ImportReport, Importer};
use colored::Colorize;
use std::path::PathBuf;

/// Import a snapshot from a completed upload or a payload file.
///
/// Progress for a keyed import is written to the status tracker. A
/// table-fatal failure prints the partial report, then returns
/// `ImportFailed`.
///
/// # Errors
///
/// Returns an error if the payload can't be fetched or decoded, or if the
/// import stopped at a table.
pub fn execute(
    args: &ImportArgs,
    db_path: Option<&PathBuf>,
    blob_dir: Option<&PathBuf>,
    status_dir: Option<&PathBuf>,
    settings: &SyncSettings,
    json: bool,
) -> Result<()> {
    let mut options = settings.import_options();
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
        options.min_batch_size = options.min_batch_size.min(batch_size);
    }

    let report = match (&args.key, &args.file) {
        (Some(key), _) => {
            let store = super::open_blob_store(blob_dir)?;
            let tracker = super::status_tracker(status_dir, settings)?;
            let mut storage = super::open_storage(db_path)?;
            Importer::new(&mut storage)
                .with_options(options)
                .with_tracker(&tracker, key)
                .run_from_key(&store, key, args.sync_version)?
        }
        (None, Some(file)) => {
            let payload = read_payload(file)?;
            let version = args.sync_version.unwrap_or(payload.version);
            let mut storage = super::open_storage(db_path)?;
            Importer::new(&mut storage)
                .with_options(options)
                .run(&payload, version)
        }
        (None, None) => {
            return Err(Error::InvalidArgument(
                "either --key or --file is required".to_string(),
            ));
        }
    };

    if json {
        super::print_json(&report)?;
    } else {
        print_report(&report);
    }

    match (report.success, report.aborted_at) {
        (true, _) => Ok(()),
        (false, table) => Err(Error::ImportFailed {
            table: table.unwrap_or_default(),
            message: report.error.unwrap_or_default(),
        }),
    }
}

fn print_report(report: &ImportReport) {
    let heading = format!("Import of sync version {}", report.sync_version);
    if report.success {
        println!("{}", heading.green().bold());
    } else {
        println!("{}", heading.red().bold());
    }
    println!();

    for (table, result) in &report.tables {
        if result.skipped {
            println!("  {table:<22} {}", "already applied".dimmed());
            continue;
        }
        println!(
            "  {table:<22} {}/{} inserted, {} conflicts, {} failed",
            result.inserted, result.attempted, result.conflicts, result.failed
        );
        for failure in &result.failures {
            println!(
                "    {} records {}..{}: {}",
                "skipped".yellow(),
                failure.offset,
                failure.offset + failure.len,
                failure.error
            );
        }
    }

    if !report.unknown_tables.is_empty() {
        println!();
        println!(
            "  {} {}",
            "Ignored unknown tables:".yellow(),
            report.unknown_tables.join(", ")
        );
    }

    println!();
    println!(
        "  Total: {}/{} records inserted",
        report.total_inserted(),
        report.total_attempted()
    );
}
