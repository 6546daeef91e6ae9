//! Chunked transport: multipart upload of a payload into the blob store.
//!
//! The protocol is driven one step per call (`start`, `upload_part`,
//! `complete`, `abort`) so each step fits inside a single request. Parts
//! carry an explicit 1-based number and may arrive in any order; only
//! `complete` fixes the order of assembly.
//!
//! ```text
//! NotStarted -> SessionOpen -> PartUploading* -> Completing -> Completed
//!                    \               \
//!                     +---------------+-> Aborted
//! ```

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sync::blob::{BlobStore, MAX_PARTS};
use crate::sync::status::StatusTracker;
use crate::sync::types::{PartRef, SyncError, SyncResult, UploadCompleted, UploadStarted};

/// Default chunk size: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Attempts per part before `upload_payload` gives up.
pub const MAX_PART_ATTEMPTS: u32 = 3;

const MAX_KEY_LEN: usize = 128;

/// Multipart upload lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    NotStarted,
    SessionOpen,
    PartUploading,
    Completing,
    Completed,
    Aborted,
}

impl UploadState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::SessionOpen => "session_open",
            Self::PartUploading => "part_uploading",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the protocol allows moving from `self` to `next`.
    ///
    /// `Completing` may fall back to an open state when the backend rejects
    /// the part list. A session stuck in `Completing` can still be aborted.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::SessionOpen)
                | (
                    Self::SessionOpen | Self::PartUploading,
                    Self::PartUploading | Self::Completing | Self::Aborted
                )
                | (
                    Self::Completing,
                    Self::Completed | Self::SessionOpen | Self::PartUploading | Self::Aborted
                )
        )
    }

    /// Checked transition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the move isn't allowed.
    pub fn transition(self, next: Self) -> SyncResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SyncError::InvalidState {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh sync key: `sync-<unix-millis>-<8 hex>`.
#[must_use]
pub fn generate_sync_key() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("sync-{millis}-{}", &random[..8])
}

/// Validate a caller-supplied sync key.
///
/// Keys double as file names in the filesystem backend, so anything that
/// could escape the objects directory is rejected.
///
/// # Errors
///
/// Returns `InvalidKey` with the reason.
pub fn validate_key(key: &str) -> SyncResult<()> {
    let invalid = |reason: &str| SyncError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("longer than 128 characters"));
    }
    if key.starts_with('.') {
        return Err(invalid("starts with '.'"));
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(invalid(&format!("contains {c:?}")));
    }
    Ok(())
}

/// Number of parts needed for `size` bytes.
#[must_use]
pub const fn part_count(size: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Byte range covered by 1-based `part_number`: `[(n-1)*C, min(size, n*C))`.
///
/// Returns `None` for part 0 or a part past the end of the payload.
#[must_use]
pub fn chunk_range(part_number: u32, size: usize, chunk_size: usize) -> Option<Range<usize>> {
    let index = usize::try_from(part_number.checked_sub(1)?).ok()?;
    let start = index.checked_mul(chunk_size)?;
    if chunk_size == 0 || start >= size {
        return None;
    }
    Some(start..start.saturating_add(chunk_size).min(size))
}

/// Drives multipart uploads against a [`BlobStore`].
pub struct ChunkedTransport<'a, B: BlobStore + ?Sized> {
    store: &'a B,
    chunk_size: usize,
    tracker: Option<&'a StatusTracker>,
}

impl<'a, B: BlobStore + ?Sized> ChunkedTransport<'a, B> {
    #[must_use]
    pub fn new(store: &'a B) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            tracker: None,
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Record `pending` in the status tracker once an upload completes.
    #[must_use]
    pub fn with_tracker(mut self, tracker: &'a StatusTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Open an upload session, generating a key if none is given.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for a bad caller key, or a backend error.
    pub fn start(&self, key: Option<&str>) -> SyncResult<UploadStarted> {
        if self.chunk_size == 0 {
            return Err(SyncError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        let sync_key = match key {
            Some(k) => {
                validate_key(k)?;
                k.to_string()
            }
            None => generate_sync_key(),
        };

        let upload_id = self.store.create_multipart(&sync_key, self.chunk_size)?;
        info!(key = %sync_key, upload_id = %upload_id, chunk_size = self.chunk_size, "Upload session started");

        Ok(UploadStarted {
            sync_key,
            upload_id,
            chunk_size: self.chunk_size,
        })
    }

    /// Upload one part. Uploading the same number again replaces it.
    ///
    /// # Errors
    ///
    /// Returns `UploadNotFound` for an unknown session, `InvalidPart` for a
    /// bad number or body, or a backend error. The session stays open.
    pub fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> SyncResult<PartRef> {
        let etag = self.store.put_part(key, upload_id, part_number, bytes)?;
        debug!(key, part_number, size = bytes.len(), "Uploaded part");
        Ok(PartRef { part_number, etag })
    }

    /// Assemble the blob from `parts`, in the order given.
    ///
    /// # Errors
    ///
    /// Returns `IncompleteUpload` when parts are missing, `InvalidPart` for an
    /// ETag or size mismatch. The session stays open and abortable.
    pub fn complete(&self, key: &str, upload_id: &str, parts: &[PartRef]) -> SyncResult<UploadCompleted> {
        if parts.is_empty() {
            return Err(SyncError::InvalidArgument("parts list is empty".to_string()));
        }

        let size = self.store.complete_multipart(key, upload_id, parts)?;
        if let Some(tracker) = self.tracker {
            tracker.mark_pending(key);
        }

        Ok(UploadCompleted {
            sync_key: key.to_string(),
            size,
            parts: parts.len(),
        })
    }

    /// Discard an open session and its parts.
    ///
    /// # Errors
    ///
    /// Returns `UploadNotFound` if the session no longer exists.
    pub fn abort(&self, key: &str, upload_id: &str) -> SyncResult<()> {
        self.store.abort_multipart(key, upload_id)
    }

    /// Run the whole protocol for an in-memory payload.
    ///
    /// Each part gets up to [`MAX_PART_ATTEMPTS`] tries on I/O failure. If a
    /// part still fails, or completion fails, the session is aborted.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the upload.
    pub fn upload_payload(&self, bytes: &[u8], key: Option<&str>) -> SyncResult<UploadCompleted> {
        if bytes.is_empty() {
            return Err(SyncError::InvalidArgument("payload is empty".to_string()));
        }

        let total = part_count(bytes.len(), self.chunk_size);
        if total > MAX_PARTS as usize {
            return Err(SyncError::InvalidArgument(format!(
                "payload needs {total} parts, more than the {MAX_PARTS} allowed; raise the chunk size"
            )));
        }

        let started = self.start(key)?;
        let result = self.send_parts(&started, bytes, total).and_then(|parts| {
            self.complete(&started.sync_key, &started.upload_id, &parts)
        });

        if let Err(e) = &result {
            warn!(key = %started.sync_key, error = %e, "Upload failed, aborting session");
            if let Err(abort_err) = self.abort(&started.sync_key, &started.upload_id) {
                warn!(key = %started.sync_key, error = %abort_err, "Abort failed");
            }
        }
        result
    }

    fn send_parts(&self, started: &UploadStarted, bytes: &[u8], total: usize) -> SyncResult<Vec<PartRef>> {
        let mut parts = Vec::with_capacity(total);
        for part_number in (1..).take(total) {
            let Some(range) = chunk_range(part_number, bytes.len(), self.chunk_size) else {
                break;
            };
            let chunk = &bytes[range];

            let mut attempt = 1;
            let part = loop {
                match self.upload_part(&started.sync_key, &started.upload_id, part_number, chunk) {
                    Ok(part) => break part,
                    Err(SyncError::Io(e)) if attempt < MAX_PART_ATTEMPTS => {
                        warn!(part_number, attempt, error = %e, "Part upload failed, retrying");
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            };
            parts.push(part);
        }

        info!(key = %started.sync_key, parts = parts.len(), "All parts uploaded");
        Ok(parts)
    }

    /// Read a completed blob.
    ///
    /// # Errors
    ///
    /// Returns `BlobNotFound` if no completed upload exists for `key`.
    pub fn fetch(&self, key: &str) -> SyncResult<Vec<u8>> {
        validate_key(key)?;
        self.store.get(key)
    }
}
