//! ev_io — canonical JSON, hashing, and atomic file writes.
//!
//! Minimal, single-source-of-truth I/O crate:
//! - `canonical_json`: byte-deterministic serialization (sorted keys, compact
//!   separators, ASCII escaping). Every hash, integrity check, and replay
//!   comparison in the workspace flows through it.
//! - `hasher`: SHA-256 over bytes, streams, files, and canonical JSON.
//! - `atomic`: temp-then-rename writes with crash-orphan cleanup.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for ev_io (used by canonical_json/hasher/atomic).
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (create_dir_all, rename, fsync, etc.)
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON serialization/deserialization errors.
    #[error("json error: {0}")]
    Json(String),

    /// Hashing-related errors (read failures mid-stream).
    #[error("hash error: {0}")]
    Hash(String),

    /// Generic validation / invariants.
    #[error("invalid: {0}")]
    Invalid(String),
}

pub type IoResult<T> = Result<T, IoError>;

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        IoError::Json(e.to_string())
    }
}

pub mod atomic;
pub mod canonical_json;
pub mod hasher;

pub mod prelude {
    pub use crate::canonical_json::{to_canonical_bytes, to_canonical_string};
    pub use crate::hasher::{sha256_canonical, sha256_file, sha256_hex, sha256_stream};
    pub use crate::{IoError, IoResult};
}
