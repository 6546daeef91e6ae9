//! Blob storage with multipart upload semantics.
//!
//! The blob store is the only thing the upload and import halves share.
//! Multipart sessions live in the backend, not in process memory, so
//! `start`, each `upload part` and `complete` may run in separate
//! invocations.
//!
//! The backend is the source of truth for completion: it checks the
//! caller's part list against what was actually stored before assembling
//! the blob.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sync::file::{atomic_concat, atomic_write};
use crate::sync::hash::{etag, etag_matches};
use crate::sync::transport::{validate_key, UploadState};
use crate::sync::types::{PartRef, SyncError, SyncResult};

/// Highest part number accepted (matches common object-store limits).
pub const MAX_PARTS: u32 = 10_000;

/// What the backend remembers about one stored part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPart {
    pub etag: String,
    pub size: u64,
}

/// A multipart upload session as tracked by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub sync_key: String,
    pub upload_id: String,
    pub chunk_size: usize,
    pub state: UploadState,
    pub parts: BTreeMap<u32, StoredPart>,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl UploadSession {
    fn new(sync_key: &str, chunk_size: usize) -> Self {
        Self {
            sync_key: sync_key.to_string(),
            upload_id: uuid::Uuid::new_v4().simple().to_string(),
            chunk_size,
            state: UploadState::SessionOpen,
            parts: BTreeMap::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Move to `next`, rejecting transitions the protocol doesn't allow.
    fn transition(&mut self, next: UploadState) -> SyncResult<()> {
        self.state = self.state.transition(next)?;
        Ok(())
    }

    /// State to fall back to when a completion attempt fails.
    fn open_state(&self) -> UploadState {
        if self.parts.is_empty() {
            UploadState::SessionOpen
        } else {
            UploadState::PartUploading
        }
    }

    /// Check a part body before storing it.
    fn check_part(&self, part_number: u32, bytes: &[u8]) -> SyncResult<()> {
        if part_number == 0 || part_number > MAX_PARTS {
            return Err(SyncError::InvalidPart {
                part_number,
                reason: format!("part numbers run from 1 to {MAX_PARTS}"),
            });
        }
        if bytes.is_empty() {
            return Err(SyncError::InvalidPart {
                part_number,
                reason: "empty body".to_string(),
            });
        }
        if bytes.len() > self.chunk_size {
            return Err(SyncError::InvalidPart {
                part_number,
                reason: format!(
                    "{} bytes exceeds chunk size {}",
                    bytes.len(),
                    self.chunk_size
                ),
            });
        }
        Ok(())
    }

    /// Validate a completion request against the stored parts.
    ///
    /// The list must be exactly `1..=n` in ascending order and cover every
    /// stored part. Each listed part must be stored with a matching ETag, and
    /// every part except the last must be a full chunk.
    pub fn check_completion(&self, parts: &[PartRef]) -> SyncResult<()> {
        if parts.is_empty() {
            return Err(SyncError::InvalidArgument("parts list is empty".to_string()));
        }

        let highest = parts.iter().map(|p| p.part_number).max().unwrap_or(0);
        let listed: std::collections::HashSet<u32> = parts.iter().map(|p| p.part_number).collect();
        let mut missing: Vec<u32> = (1..=highest)
            .filter(|n| !listed.contains(n) || !self.parts.contains_key(n))
            .collect();
        if !missing.is_empty() {
            missing.dedup();
            return Err(SyncError::IncompleteUpload { missing });
        }

        // Stored parts past the list would be silently dropped from the blob
        let unlisted: Vec<u32> = self.parts.range(highest.saturating_add(1)..).map(|(n, _)| *n).collect();
        if !unlisted.is_empty() {
            return Err(SyncError::IncompleteUpload { missing: unlisted });
        }

        for (i, part) in parts.iter().enumerate() {
            let expected = u32::try_from(i + 1).unwrap_or(u32::MAX);
            if part.part_number != expected {
                return Err(SyncError::InvalidArgument(format!(
                    "parts must be listed once each in ascending order (position {} holds part {})",
                    i + 1,
                    part.part_number
                )));
            }

            // Presence was checked above
            let Some(stored) = self.parts.get(&part.part_number) else {
                return Err(SyncError::IncompleteUpload {
                    missing: vec![part.part_number],
                });
            };

            if !etag_matches(&part.etag, &stored.etag) {
                return Err(SyncError::InvalidPart {
                    part_number: part.part_number,
                    reason: "etag does not match the stored part".to_string(),
                });
            }

            let is_last = i + 1 == parts.len();
            let full = stored.size == self.chunk_size as u64;
            if !is_last && !full {
                return Err(SyncError::InvalidPart {
                    part_number: part.part_number,
                    reason: format!(
                        "only the final part may be shorter than {} bytes (got {})",
                        self.chunk_size, stored.size
                    ),
                });
            }
        }

        Ok(())
    }

    fn not_found(key: &str, upload_id: &str) -> SyncError {
        SyncError::UploadNotFound {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        }
    }
}

/// Object storage with multipart uploads.
pub trait BlobStore {
    /// Open a multipart session for `key`. Returns the upload ID.
    fn create_multipart(&self, key: &str, chunk_size: usize) -> SyncResult<String>;

    /// Store one part. Re-uploading a part number replaces it. Returns the ETag.
    fn put_part(&self, key: &str, upload_id: &str, part_number: u32, bytes: &[u8])
        -> SyncResult<String>;

    /// Assemble the blob from exactly `parts`, in order. Returns its size.
    ///
    /// On failure the session stays open and abortable.
    fn complete_multipart(&self, key: &str, upload_id: &str, parts: &[PartRef]) -> SyncResult<u64>;

    /// Discard an open session and its stored parts.
    fn abort_multipart(&self, key: &str, upload_id: &str) -> SyncResult<()>;

    /// Inspect an open session.
    fn session(&self, key: &str, upload_id: &str) -> SyncResult<UploadSession>;

    /// List open sessions.
    fn list_uploads(&self) -> SyncResult<Vec<UploadSession>>;

    /// Read a stored blob.
    fn get(&self, key: &str) -> SyncResult<Vec<u8>>;

    /// Whether a blob is stored under `key`.
    fn exists(&self, key: &str) -> SyncResult<bool>;

    /// Delete a stored blob. Returns whether it existed.
    fn delete(&self, key: &str) -> SyncResult<bool>;
}

// ── Filesystem backend ────────────────────────────────────────

/// Durable blob store on the local filesystem.
///
/// Layout:
/// ```text
/// <root>/objects/<sync-key>
/// <root>/uploads/<upload-id>/session.json
/// <root>/uploads/<upload-id>/part-00001
/// ```
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a blob store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: &Path) -> SyncResult<Self> {
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("uploads"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn object_path(&self, key: &str) -> SyncResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join("objects").join(key))
    }

    fn upload_dir(&self, upload_id: &str) -> SyncResult<PathBuf> {
        if upload_id.is_empty() || !upload_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SyncError::InvalidArgument(format!(
                "malformed upload id: {upload_id}"
            )));
        }
        Ok(self.root.join("uploads").join(upload_id))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{part_number:05}"))
    }

    fn etag_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{part_number:05}.etag"))
    }

    /// Part number of a `part-NNNNN` body file.
    fn parse_part_name(name: &str) -> Option<u32> {
        let digits = name.strip_prefix("part-")?;
        if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Parts recorded in an upload directory.
    ///
    /// Each part lives in its own body file plus an ETag sidecar written
    /// after the body. A body without a sidecar is still in flight and is
    /// not listed.
    fn recorded_parts(dir: &Path) -> SyncResult<BTreeMap<u32, StoredPart>> {
        let mut parts = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let Some(part_number) = entry.file_name().to_str().and_then(Self::parse_part_name)
            else {
                continue;
            };
            let Ok(tag) = fs::read_to_string(Self::etag_path(dir, part_number)) else {
                continue;
            };
            parts.insert(
                part_number,
                StoredPart {
                    etag: tag.trim().to_string(),
                    size: entry.metadata()?.len(),
                },
            );
        }
        Ok(parts)
    }

    /// Read the session in `dir`, or `None` if there is no session file.
    ///
    /// `session.json` is written once at creation. Part state is derived
    /// from the part files, and a `Completing` state left by an interrupted
    /// completion reads as open again.
    fn read_session(dir: &Path) -> SyncResult<Option<UploadSession>> {
        let meta = dir.join("session.json");
        if !meta.exists() {
            return Ok(None);
        }

        let mut session: UploadSession = serde_json::from_slice(&fs::read(&meta)?)?;
        session.parts = Self::recorded_parts(dir)?;
        if matches!(
            session.state,
            UploadState::SessionOpen | UploadState::PartUploading | UploadState::Completing
        ) {
            session.state = session.open_state();
        }
        Ok(Some(session))
    }

    fn load_session(&self, key: &str, upload_id: &str) -> SyncResult<UploadSession> {
        match Self::read_session(&self.upload_dir(upload_id)?)? {
            Some(session) if session.sync_key == key => Ok(session),
            _ => Err(UploadSession::not_found(key, upload_id)),
        }
    }
}

impl BlobStore for FsBlobStore {
    fn create_multipart(&self, key: &str, chunk_size: usize) -> SyncResult<String> {
        validate_key(key)?;
        let session = UploadSession::new(key, chunk_size);
        let dir = self.upload_dir(&session.upload_id)?;
        fs::create_dir_all(&dir)?;
        atomic_write(&dir.join("session.json"), &serde_json::to_vec_pretty(&session)?)?;

        debug!(key, upload_id = %session.upload_id, "Opened multipart session");
        Ok(session.upload_id)
    }

    fn put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> SyncResult<String> {
        let mut session = self.load_session(key, upload_id)?;
        session.check_part(part_number, bytes)?;
        session.transition(UploadState::PartUploading)?;

        let dir = self.upload_dir(upload_id)?;
        let tag = etag(bytes);
        // Body before sidecar, so a listed part always has its bytes
        atomic_write(&Self::part_path(&dir, part_number), bytes)?;
        atomic_write(&Self::etag_path(&dir, part_number), tag.as_bytes())?;
        Ok(tag)
    }

    fn complete_multipart(&self, key: &str, upload_id: &str, parts: &[PartRef]) -> SyncResult<u64> {
        let mut session = self.load_session(key, upload_id)?;
        session.transition(UploadState::Completing)?;

        // Verify against the bodies themselves, not the sidecars
        let dir = self.upload_dir(upload_id)?;
        for (part_number, stored) in &mut session.parts {
            let bytes = fs::read(Self::part_path(&dir, *part_number))?;
            stored.etag = etag(&bytes);
            stored.size = bytes.len() as u64;
        }
        session.check_completion(parts)?;

        let sources: Vec<PathBuf> = parts
            .iter()
            .map(|p| Self::part_path(&dir, p.part_number))
            .collect();
        let size = atomic_concat(&self.object_path(key)?, &sources)?;
        session.transition(UploadState::Completed)?;

        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!(key, upload_id, error = %e, "Blob stored but upload directory not removed");
        }
        info!(key, upload_id, size, parts = parts.len(), "Multipart upload completed");
        Ok(size)
    }

    fn abort_multipart(&self, key: &str, upload_id: &str) -> SyncResult<()> {
        let mut session = self.load_session(key, upload_id)?;
        session.transition(UploadState::Aborted)?;
        fs::remove_dir_all(self.upload_dir(upload_id)?)?;

        info!(key, upload_id, parts = session.parts.len(), "Multipart upload aborted");
        Ok(())
    }

    fn session(&self, key: &str, upload_id: &str) -> SyncResult<UploadSession> {
        self.load_session(key, upload_id)
    }

    fn list_uploads(&self) -> SyncResult<Vec<UploadSession>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(self.root.join("uploads"))? {
            if let Some(session) = Self::read_session(&entry?.path())? {
                sessions.push(session);
            }
        }
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    fn get(&self, key: &str) -> SyncResult<Vec<u8>> {
        let path = self.object_path(key)?;
        if !path.exists() {
            return Err(SyncError::BlobNotFound(key.to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn exists(&self, key: &str) -> SyncResult<bool> {
        Ok(self.object_path(key)?.exists())
    }

    fn delete(&self, key: &str) -> SyncResult<bool> {
        let path = self.object_path(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}

// ── In-memory backend ─────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    objects: HashMap<String, Vec<u8>>,
    uploads: HashMap<String, (UploadSession, BTreeMap<u32, Vec<u8>>)>,
}

/// In-process blob store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_upload<R>(
        &self,
        key: &str,
        upload_id: &str,
        f: impl FnOnce(&mut MemoryInner) -> SyncResult<R>,
    ) -> SyncResult<R> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let owned = inner
            .uploads
            .get(upload_id)
            .is_some_and(|(session, _)| session.sync_key == key);
        if !owned {
            return Err(UploadSession::not_found(key, upload_id));
        }
        f(&mut inner)
    }
}

impl BlobStore for MemoryBlobStore {
    fn create_multipart(&self, key: &str, chunk_size: usize) -> SyncResult<String> {
        validate_key(key)?;
        let session = UploadSession::new(key, chunk_size);
        let upload_id = session.upload_id.clone();

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.uploads.insert(upload_id.clone(), (session, BTreeMap::new()));
        Ok(upload_id)
    }

    fn put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> SyncResult<String> {
        self.with_upload(key, upload_id, |inner| {
            let Some((session, data)) = inner.uploads.get_mut(upload_id) else {
                return Err(UploadSession::not_found(key, upload_id));
            };
            session.check_part(part_number, bytes)?;
            session.transition(UploadState::PartUploading)?;

            let tag = etag(bytes);
            session.parts.insert(
                part_number,
                StoredPart {
                    etag: tag.clone(),
                    size: bytes.len() as u64,
                },
            );
            data.insert(part_number, bytes.to_vec());
            Ok(tag)
        })
    }

    fn complete_multipart(&self, key: &str, upload_id: &str, parts: &[PartRef]) -> SyncResult<u64> {
        self.with_upload(key, upload_id, |inner| {
            let Some((session, data)) = inner.uploads.get_mut(upload_id) else {
                return Err(UploadSession::not_found(key, upload_id));
            };
            session.transition(UploadState::Completing)?;

            if let Err(e) = session.check_completion(parts) {
                let open = session.open_state();
                session.transition(open)?;
                return Err(e);
            }

            let mut blob = Vec::new();
            for part in parts {
                if let Some(bytes) = data.get(&part.part_number) {
                    blob.extend_from_slice(bytes);
                }
            }
            session.transition(UploadState::Completed)?;

            let size = blob.len() as u64;
            inner.uploads.remove(upload_id);
            inner.objects.insert(key.to_string(), blob);
            Ok(size)
        })
    }

    fn abort_multipart(&self, key: &str, upload_id: &str) -> SyncResult<()> {
        self.with_upload(key, upload_id, |inner| {
            if let Some((session, _)) = inner.uploads.get_mut(upload_id) {
                session.transition(UploadState::Aborted)?;
            }
            inner.uploads.remove(upload_id);
            Ok(())
        })
    }

    fn session(&self, key: &str, upload_id: &str) -> SyncResult<UploadSession> {
        self.with_upload(key, upload_id, |inner| {
            inner
                .uploads
                .get(upload_id)
                .map(|(session, _)| session.clone())
                .ok_or_else(|| UploadSession::not_found(key, upload_id))
        })
    }

    fn list_uploads(&self) -> SyncResult<Vec<UploadSession>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut sessions: Vec<UploadSession> =
            inner.uploads.values().map(|(s, _)| s.clone()).collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    fn get(&self, key: &str) -> SyncResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::BlobNotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> SyncResult<bool> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.objects.contains_key(key))
    }

    fn delete(&self, key: &str) -> SyncResult<bool> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.objects.remove(key).is_some())
    }
}
