//! Transport command implementations.
//!
//! One protocol step per invocation, so each call stays within a single
//! request's limits. The session lives in the blob store between calls.

use crate::cli::TransportCommands;
use crate::config::SyncSettings;
use crate::error::Result;
use crate::sync::{chunk_range, BlobStore, ChunkedTransport, FsBlobStore, PartRef, SyncError};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Execute transport commands.
pub fn execute(
    command: &TransportCommands,
    blob_dir: Option<&PathBuf>,
    status_dir: Option<&PathBuf>,
    settings: &SyncSettings,
    json: bool,
) -> Result<()> {
    let store = super::open_blob_store(blob_dir)?;

    match command {
        TransportCommands::Start { key, chunk_size } => {
            let transport = ChunkedTransport::new(&store)
                .with_chunk_size(chunk_size.unwrap_or(settings.chunk_size));
            start(&transport, key.as_deref(), json)
        }
        TransportCommands::Part {
            key,
            upload_id,
            part_number,
            file,
            slice,
        } => part(&store, key, upload_id, *part_number, file, *slice, json),
        TransportCommands::Complete {
            key,
            upload_id,
            parts,
        } => {
            let tracker = super::status_tracker(status_dir, settings)?;
            let transport = ChunkedTransport::new(&store).with_tracker(&tracker);
            complete(&transport, key, upload_id, parts, json)
        }
        TransportCommands::Abort { key, upload_id } => {
            ChunkedTransport::new(&store).abort(key, upload_id)?;
            if json {
                return super::print_json(&serde_json::json!({ "aborted": true }));
            }
            println!("Aborted upload {upload_id}");
            Ok(())
        }
        TransportCommands::List => list(&store, json),
    }
}

fn start(transport: &ChunkedTransport<'_, FsBlobStore>, key: Option<&str>, json: bool) -> Result<()> {
    let started = transport.start(key)?;

    if json {
        return super::print_json(&started);
    }

    println!("Upload session started");
    println!("  Sync key:   {}", started.sync_key.bold());
    println!("  Upload ID:  {}", started.upload_id);
    println!("  Chunk size: {} bytes", started.chunk_size);
    Ok(())
}

fn part(
    store: &FsBlobStore,
    key: &str,
    upload_id: &str,
    part_number: u32,
    file: &Path,
    slice: bool,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(file)?;

    let body = if slice {
        let chunk_size = store.session(key, upload_id)?.chunk_size;
        let range = chunk_range(part_number, bytes.len(), chunk_size).ok_or_else(|| {
            SyncError::InvalidPart {
                part_number,
                reason: format!("outside a {}-byte payload", bytes.len()),
            }
        })?;
        &bytes[range]
    } else {
        &bytes[..]
    };

    let part = ChunkedTransport::new(store).upload_part(key, upload_id, part_number, body)?;

    if json {
        return super::print_json(&part);
    }

    println!("Uploaded part {} ({} bytes)", part.part_number, body.len());
    println!("  ETag: {}", part.etag);
    Ok(())
}

fn complete(
    transport: &ChunkedTransport<'_, FsBlobStore>,
    key: &str,
    upload_id: &str,
    parts: &[PartRef],
    json: bool,
) -> Result<()> {
    let done = transport.complete(key, upload_id, parts)?;

    if json {
        return super::print_json(&done);
    }

    println!("{}", "Upload complete".green());
    println!("  Sync key: {}", done.sync_key.bold());
    println!("  Size:     {} bytes in {} parts", done.size, done.parts);
    Ok(())
}

fn list(store: &FsBlobStore, json: bool) -> Result<()> {
    let sessions = store.list_uploads()?;

    if json {
        return super::print_json(&sessions);
    }

    if sessions.is_empty() {
        println!("{}", "No open upload sessions.".dimmed());
        return Ok(());
    }

    println!("{}", "Open upload sessions:".blue().bold());
    for session in &sessions {
        println!(
            "  {} {} ({} parts, {})",
            session.sync_key.bold(),
            session.upload_id.dimmed(),
            session.parts.len(),
            session.state
        );
    }
    Ok(())
}
