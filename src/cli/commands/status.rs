//! Status command implementations.

use crate::cli::{StatusArgs, StatusCommands};
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::sync::print_status;
use std::path::PathBuf;

/// Show the status for a sync key, or purge expired records.
///
/// # Errors
///
/// Returns `StatusNotFound` if no live record exists for the key.
pub fn execute(
    args: &StatusArgs,
    status_dir: Option<&PathBuf>,
    settings: &SyncSettings,
    json: bool,
) -> Result<()> {
    let tracker = super::status_tracker(status_dir, settings)?;

    if let Some(StatusCommands::Purge) = args.command {
        let removed = tracker.purge_expired()?;
        if json {
            return super::print_json(&serde_json::json!({ "removed": removed }));
        }
        println!("Removed {removed} expired status record(s)");
        return Ok(());
    }

    let key = args
        .key
        .as_deref()
        .ok_or_else(|| Error::InvalidArgument("a sync key is required".to_string()))?;
    let record = tracker.get(key).ok_or_else(|| Error::StatusNotFound {
        key: key.to_string(),
    })?;

    if json {
        return super::print_json(&record);
    }

    print_status(&record);
    Ok(())
}
