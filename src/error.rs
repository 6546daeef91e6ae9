//! Error types for dashsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 6=sync, ...)
//! - Retryability flags so scripted callers know when to fix input and retry
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Result type alias for dashsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    StatusNotFound,
    BlobNotFound,
    UploadNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidKey,
    InvalidPart,
    MalformedPayload,
    UnknownTable,

    // Protocol (exit 5)
    IncompleteUpload,
    InvalidState,

    // Sync (exit 6)
    ImportFailed,
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::StatusNotFound => "STATUS_NOT_FOUND",
            Self::BlobNotFound => "BLOB_NOT_FOUND",
            Self::UploadNotFound => "UPLOAD_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidKey => "INVALID_KEY",
            Self::InvalidPart => "INVALID_PART",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::UnknownTable => "UNKNOWN_TABLE",
            Self::IncompleteUpload => "INCOMPLETE_UPLOAD",
            Self::InvalidState => "INVALID_STATE",
            Self::ImportFailed => "IMPORT_FAILED",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::StatusNotFound | Self::BlobNotFound | Self::UploadNotFound => 3,
            Self::InvalidArgument
            | Self::InvalidKey
            | Self::InvalidPart
            | Self::MalformedPayload
            | Self::UnknownTable => 4,
            Self::IncompleteUpload | Self::InvalidState => 5,
            Self::ImportFailed | Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the caller should retry.
    ///
    /// True for input errors (retry with corrected input), incomplete
    /// uploads (upload the missing parts, then complete again) and
    /// table-fatal import failures (re-invoke; the ledger resumes the run).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::InvalidKey
                | Self::InvalidPart
                | Self::UnknownTable
                | Self::IncompleteUpload
                | Self::ImportFailed
                | Self::DatabaseError
                | Self::IoError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in dashsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `dashsync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("No sync status for key: {key}")]
    StatusNotFound { key: String },

    #[error("Import aborted at table {table}: {message}")]
    ImportFailed { table: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::StatusNotFound { .. } => ErrorCode::StatusNotFound,
            Self::ImportFailed { .. } => ErrorCode::ImportFailed,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Sync(e) => e.error_code(),
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `dashsync init` to create the database and blob store".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::StatusNotFound { .. } => Some(
                "Status records expire after 24 hours. An absent record means unknown, \
                 not failed; check `dashsync ledger` for applied tables."
                    .to_string(),
            ),

            Self::ImportFailed { .. } => Some(
                "Tables applied before the failure are recorded in the ledger. \
                 Re-run the same import to resume from the failed table."
                    .to_string(),
            ),

            Self::Sync(e) => e.hint(),

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(Error::StatusNotFound { key: "k".into() }.exit_code(), 3);
        assert_eq!(Error::InvalidArgument("x".into()).exit_code(), 4);
        assert_eq!(
            Error::ImportFailed {
                table: "authors".into(),
                message: "locked".into()
            }
            .exit_code(),
            6
        );
    }

    #[test]
    fn test_sync_error_delegates_code() {
        let err: Error = SyncError::IncompleteUpload {
            missing: vec![2],
        }
        .into();
        assert_eq!(err.error_code(), ErrorCode::IncompleteUpload);
        assert_eq!(err.exit_code(), 5);
        assert!(err.error_code().is_retryable());
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let json = Error::NotInitialized.to_structured_json();
        assert_eq!(json["error"]["code"], "NOT_INITIALIZED");
        assert_eq!(json["error"]["exit_code"], 2);
        assert!(json["error"]["hint"].is_string());

        let json = Error::Other("boom".into()).to_structured_json();
        assert!(json["error"].get("hint").is_none());
    }
}
