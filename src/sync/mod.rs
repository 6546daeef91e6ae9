//! Cross-environment snapshot sync.
//!
//! Moves a full relational snapshot from one deployment to another when the
//! two share no network or database access:
//!
//! - **Export**: consistent read of every synced table into a payload
//! - **Transport**: chunked multipart upload into a blob store, addressed
//!   by a sync key
//! - **Import**: per-table ledger gate, normalization, conflict filtering
//!   and degrading batch inserts, in dependency order
//! - **Status**: TTL'd progress record per sync key, for polling
//!
//! # Architecture
//!
//! Upload and import are separate operations that share only the sync key.
//! All state that crosses between them lives in the blob store, the sync
//! ledger or the status record, never in process memory.
//!
//! # Example
//!
//! ```ignore
//! use dashsync::sync::{ChunkedTransport, Exporter, FsBlobStore, Importer};
//!
//! // Source environment
//! let result = Exporter::new(&source).export(None, 42)?;
//! let store = FsBlobStore::open(&blob_dir)?;
//! let done = ChunkedTransport::new(&store).upload_payload(&result.payload.to_bytes()?, None)?;
//!
//! // Target environment, later
//! let report = Importer::new(&mut target).run_from_key(&store, &done.sync_key, None)?;
//! ```

mod blob;
mod export;
mod file;
mod hash;
mod import;
pub mod schema;
mod status;
mod transport;
mod types;

// Re-export main types and functions
pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore, StoredPart, UploadSession, MAX_PARTS};
pub use export::Exporter;
pub use file::{atomic_write, file_size, read_payload, write_payload};
pub use hash::etag;
pub use import::{ImportOptions, Importer, DEFAULT_BATCH_SIZE, DEFAULT_MIN_BATCH_SIZE};
pub use status::{print_status, Progress, StatusTracker, SyncState, SyncStatusRecord, DEFAULT_STATUS_TTL};
pub use transport::{
    chunk_range, generate_sync_key, part_count, validate_key, ChunkedTransport, UploadState,
    DEFAULT_CHUNK_SIZE, MAX_PART_ATTEMPTS,
};
pub use types::{
    BatchFailure, ExportResult, ImportReport, PartRef, Record, SnapshotPayload, SyncError,
    SyncResult, TableResult, UploadCompleted, UploadStarted,
};
