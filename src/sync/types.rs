//! Sync types shared by export, transport, import and status.
//!
//! Everything that crosses an invocation boundary (payload, upload
//! responses, status records) serializes camelCase so the dashboard's web
//! layer can pass it through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
pub use crate::storage::Record;

/// A full relational snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    /// Sync version this snapshot was exported under.
    pub version: i64,
    /// Records per table name, in export order.
    pub data: BTreeMap<String, Vec<Record>>,
    /// RFC 3339 export time.
    pub timestamp: String,
}

impl SnapshotPayload {
    /// Decode a payload from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` if the bytes are not JSON or lack a
    /// `data` object. Nothing is touched before this check passes.
    pub fn from_slice(bytes: &[u8]) -> SyncResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;

        match value.get("data") {
            Some(serde_json::Value::Object(_)) => {}
            Some(_) => {
                return Err(SyncError::MalformedPayload(
                    "`data` must be an object of table name to records".to_string(),
                ))
            }
            None => return Err(SyncError::MalformedPayload("missing `data` field".to_string())),
        }

        serde_json::from_value(value).map_err(|e| SyncError::MalformedPayload(e.to_string()))
    }

    /// Serialize to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Table names in the payload that the registry doesn't know.
    #[must_use]
    pub fn validate_tables(&self) -> Vec<&str> {
        self.data
            .keys()
            .map(String::as_str)
            .filter(|name| !crate::sync::schema::is_known(name))
            .collect()
    }

    /// Total number of records across all tables.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// Output of an export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub counts_per_table: BTreeMap<String, usize>,
    pub payload: SnapshotPayload,
}

/// A part reference: what the backend returned for one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRef {
    pub part_number: u32,
    pub etag: String,
}

/// Response to `transport.start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStarted {
    pub sync_key: String,
    pub upload_id: String,
    pub chunk_size: usize,
}

/// Response to `transport.complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleted {
    pub sync_key: String,
    pub size: u64,
    pub parts: usize,
}

/// A sub-batch that could not be inserted, attributed by record offset
/// within the table (after conflict filtering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub offset: usize,
    pub len: usize,
    pub error: String,
}

/// Per-table import outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResult {
    /// Records present in the payload for this table.
    pub attempted: usize,
    /// Records actually written.
    pub inserted: usize,
    /// True when the ledger gate found this (table, version) already applied.
    pub skipped: bool,
    /// Records filtered out because their natural key already exists.
    pub conflicts: usize,
    /// Records lost to failing sub-batches.
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BatchFailure>,
}

impl TableResult {
    /// Result for a table the ledger gate skipped.
    #[must_use]
    pub fn already_applied(attempted: usize) -> Self {
        Self {
            attempted,
            skipped: true,
            ..Self::default()
        }
    }
}

/// Overall import outcome.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// False when a table-fatal error stopped the run.
    pub success: bool,
    pub sync_version: i64,
    pub tables: BTreeMap<String, TableResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportReport {
    /// Total records inserted across tables.
    #[must_use]
    pub fn total_inserted(&self) -> usize {
        self.tables.values().map(|t| t.inserted).sum()
    }

    /// Total records present in the payload for processed tables.
    #[must_use]
    pub fn total_attempted(&self) -> usize {
        self.tables.values().map(|t| t.attempted).sum()
    }
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file or blob operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Payload could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Table name not in the schema registry.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Sync key fails validation.
    #[error("Invalid sync key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// No open upload session for this key / upload ID.
    #[error("Upload not found: {upload_id} (key {key})")]
    UploadNotFound { key: String, upload_id: String },

    /// A part is out of range, oversized, missing or mismatched.
    #[error("Invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },

    /// The part list handed to complete and the stored parts disagree.
    ///
    /// `missing` holds parts that are listed or implied but not stored, or
    /// stored but left off the list.
    #[error("Incomplete upload: parts {missing:?} are not both stored and listed")]
    IncompleteUpload { missing: Vec<u32> },

    /// An upload state transition that the protocol does not allow.
    #[error("Invalid upload state transition: {from} -> {to}")]
    InvalidState { from: String, to: String },

    /// No stored blob for this sync key.
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Missing or inconsistent caller input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<crate::error::Error> for SyncError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Sync(inner) => inner,
            crate::error::Error::Io(e) => Self::Io(e),
            crate::error::Error::Json(e) => Self::Json(e),
            other => Self::Database(other.to_string()),
        }
    }
}

impl SyncError {
    /// Structured code for this error.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::MalformedPayload(_) => ErrorCode::MalformedPayload,
            Self::UnknownTable(_) => ErrorCode::UnknownTable,
            Self::InvalidKey { .. } => ErrorCode::InvalidKey,
            Self::UploadNotFound { .. } => ErrorCode::UploadNotFound,
            Self::InvalidPart { .. } => ErrorCode::InvalidPart,
            Self::IncompleteUpload { .. } => ErrorCode::IncompleteUpload,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::BlobNotFound(_) => ErrorCode::BlobNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }

    /// Recovery hint, if any.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnknownTable(_) => Some(format!(
                "Known tables: {}",
                crate::sync::schema::table_names().join(", ")
            )),
            Self::IncompleteUpload { missing } => Some(format!(
                "Upload parts {missing:?} with `dashsync transport part` and list every stored part, \
                 then complete again. The session stays open until completed or aborted."
            )),
            Self::UploadNotFound { .. } => Some(
                "The session was completed, aborted or never started. \
                 Start a new one with `dashsync transport start`."
                    .to_string(),
            ),
            Self::InvalidKey { .. } => Some(
                "Sync keys are 1-128 characters of letters, digits, '.', '_' or '-', \
                 and must not start with '.'"
                    .to_string(),
            ),
            Self::BlobNotFound(_) => {
                Some("Complete the upload before triggering the import.".to_string())
            }
            _ => None,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
