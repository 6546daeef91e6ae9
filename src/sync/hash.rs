//! Content hashing for part ETags.
//!
//! Blob backends assign each uploaded part an ETag; ours is the SHA256 of
//! the part bytes, so a retried upload of identical bytes yields the same
//! ETag and completion can verify that the caller's part list matches what
//! was actually stored.

use sha2::{Digest, Sha256};

/// Compute the ETag for a chunk of bytes (lowercase hex SHA256).
#[must_use]
pub fn etag(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compare a caller-supplied ETag with a stored one.
///
/// Surrounding quotes (as S3-style clients send them) and case are ignored.
#[must_use]
pub fn etag_matches(supplied: &str, stored: &str) -> bool {
    supplied.trim_matches('"').eq_ignore_ascii_case(stored.trim_matches('"'))
}
