//! Uniform storage interface and key validation.
//!
//! Keys are slash-delimited paths relative to a configured root, e.g.
//! `originals/a1b2/a1b2c3…/video.mp4`. Canonical key form: **no leading
//! slash**; every backend enforces the same rules so keys are portable
//! between backends.

use std::io::Read;
use std::path::PathBuf;

use crate::StoreError;

/// Result of a put (write) operation. The hash is always the verified
/// SHA-256 of the stored content so callers can audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub key: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Result of a get (read) operation, with the hash of the bytes as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutcome {
    pub data: Vec<u8>,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Uniform interface for evidence byte storage.
///
/// Contract (all backends):
/// - `put*` with `expected_sha256`: computed ≠ expected ⇒
///   `IntegrityMismatch`, nothing persisted.
/// - Existing target key ⇒ `KeyExists` (immutability).
/// - Writes are observed atomically: readers never see a partial object.
/// - `delete` exists for administrative cleanup only; production paths
///   never call it on originals.
/// - `put_mutable` is the single exception to write-once, reserved for
///   manifest slots (the one append-only-mutable structure); it is atomic
///   replace, never partial.
pub trait StorageBackend: Send + Sync {
    fn put(
        &self,
        key: &str,
        data: &[u8],
        expected_sha256: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        self.put_stream(key, &mut &data[..], expected_sha256)
    }

    fn put_stream(
        &self,
        key: &str,
        reader: &mut dyn Read,
        expected_sha256: Option<&str>,
    ) -> Result<PutOutcome, StoreError>;

    fn put_mutable(&self, key: &str, data: &[u8]) -> Result<PutOutcome, StoreError>;

    fn get(&self, key: &str) -> Result<GetOutcome, StoreError>;

    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError>;

    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns true if deleted, false if not found.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys under the given prefix, sorted ascending.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Size in bytes, or None if the key does not exist.
    fn size(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Local filesystem location for the key, when the backend has one.
    /// Network backends return None (callers stream instead).
    fn local_path(&self, key: &str) -> Option<PathBuf>;
}

/// Validate a storage key. Rejects anything that could escape the configured
/// root after normalization: absolute paths, backslashes, NUL, empty
/// segments, `.` / `..`.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".into()));
    }
    if key.starts_with('/') || key.ends_with('/') {
        return Err(StoreError::InvalidKey(key.into()));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(StoreError::InvalidKey(key.into()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::InvalidKey(key.into()));
        }
    }
    Ok(())
}

/// Prefixes follow key rules but may be empty (= whole store).
pub fn validate_prefix(prefix: &str) -> Result<(), StoreError> {
    if prefix.is_empty() {
        return Ok(());
    }
    validate_key(prefix.trim_end_matches('/'))
}

/// Replace path separators and NUL in caller-supplied filenames so they can
/// be embedded in a key segment verbatim.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_keys_rejected() {
        for bad in ["", "/abs", "a//b", "a/../b", "..", "a/.", "a\\b", "a/b/"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be invalid");
        }
        assert!(validate_key("originals/9834/full/hash.bin").is_ok());
    }

    #[test]
    fn prefix_allows_empty() {
        assert!(validate_prefix("").is_ok());
        assert!(validate_prefix("originals/9834").is_ok());
        assert!(validate_prefix("/abs").is_err());
    }

    #[test]
    fn filenames_are_flattened() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("clip.mp4"), "clip.mp4");
    }
}
