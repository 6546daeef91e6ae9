//! Upload command implementation.
//!
//! Runs the whole chunked upload for a payload file in one go. Use
//! `transport` to drive the same protocol one step per invocation.

use crate::config::SyncSettings;
use crate::error::Result;
use crate::sync::{read_payload, ChunkedTransport};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Upload a payload file and print its sync key.
///
/// The file is decoded first so a malformed payload is rejected before
/// anything is uploaded.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed, or the upload fails.
pub fn execute(
    file: &Path,
    key: Option<&str>,
    chunk_size: Option<usize>,
    blob_dir: Option<&PathBuf>,
    status_dir: Option<&PathBuf>,
    settings: &SyncSettings,
    json: bool,
) -> Result<()> {
    let payload = read_payload(file)?;
    let bytes = std::fs::read(file)?;

    let store = super::open_blob_store(blob_dir)?;
    let tracker = super::status_tracker(status_dir, settings)?;
    let transport = ChunkedTransport::new(&store)
        .with_chunk_size(chunk_size.unwrap_or(settings.chunk_size))
        .with_tracker(&tracker);

    let done = transport.upload_payload(&bytes, key)?;

    if json {
        return super::print_json(&done);
    }

    println!("{}", "Upload complete".green());
    println!("  Sync key: {}", done.sync_key.bold());
    println!("  Version:  {}", payload.version);
    println!("  Size:     {} bytes in {} parts", done.size, done.parts);
    println!();
    println!("{}", format!("Run 'dashsync import --key {}' on the target.", done.sync_key).dimmed());
    Ok(())
}
