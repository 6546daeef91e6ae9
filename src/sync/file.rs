//! Atomic file operations for sync.
//!
//! Payload files, stored blobs, upload parts and status records are all
//! written the same way: write to a uniquely named temp file next to the
//! target, fsync, then rename over the target. Readers never see a partial
//! file, and concurrent writers to one target never share a temp file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::sync::types::{SnapshotPayload, SyncError, SyncResult};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Run `write` against a fresh temp file, then rename it over `path`.
///
/// The temp file is removed if writing or renaming fails.
fn replace_with<T>(path: &Path, write: impl FnOnce(&Path) -> SyncResult<T>) -> SyncResult<T> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path(path);
    let result = write(&temp).and_then(|value| {
        fs::rename(&temp, path)?;
        Ok(value)
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Write bytes to a file atomically.
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> SyncResult<()> {
    write_with_options(path, content, false)
}

/// Like [`atomic_write`], but the file is created owner-only (`0600`) on unix.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write_private(path: &Path, content: &[u8]) -> SyncResult<()> {
    write_with_options(path, content, true)
}

fn write_with_options(path: &Path, content: &[u8], private: bool) -> SyncResult<()> {
    replace_with(path, |temp| {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        if private {
            opts.mode(0o600);
        }
        #[cfg(not(unix))]
        let _ = private;

        let mut writer = BufWriter::new(opts.open(temp)?);
        writer.write_all(content)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })
}

/// Concatenate files into `path` atomically, in the order given.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns an error if any source cannot be read or the target cannot be written.
pub fn atomic_concat(path: &Path, sources: &[PathBuf]) -> SyncResult<u64> {
    replace_with(path, |temp| {
        let mut writer = BufWriter::new(File::create(temp)?);
        let mut total = 0;
        for source in sources {
            let mut reader = File::open(source)?;
            total += std::io::copy(&mut reader, &mut writer)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(total)
    })
}

/// Write a snapshot payload to a JSON file atomically.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_payload(path: &Path, payload: &SnapshotPayload) -> SyncResult<()> {
    atomic_write(path, &payload.to_bytes()?)
}

/// Read and decode a snapshot payload file.
///
/// # Errors
///
/// Returns `InvalidArgument` if the file is missing, `MalformedPayload`
/// if it doesn't decode.
pub fn read_payload(path: &Path) -> SyncResult<SnapshotPayload> {
    if !path.exists() {
        return Err(SyncError::InvalidArgument(format!(
            "payload file not found: {}",
            path.display()
        )));
    }
    SnapshotPayload::from_slice(&fs::read(path)?)
}

/// Get the size of a file in bytes.
///
/// Returns 0 if the file doesn't exist.
#[must_use]
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
