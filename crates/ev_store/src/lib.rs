//! ev_store — content-addressed evidence storage.
//!
//! Layers, bottom-up:
//! - `backend`: uniform byte-blob interface (`StorageBackend`) with strict
//!   key validation, hash-verified writes, and write-once immutability.
//! - `local_fs` / `memory`: the shipped backends. Originals are NEVER
//!   overwritten; every write is verified by SHA-256 comparison.
//! - `evidence_store`: the façade — ingest, derivatives, manifests, audit.
//! - `staging`: chunked upload assembly for multi-GB originals.
//! - `casedb` / `audit_log`: single-node JSON-file implementations of the
//!   external-collaborator traits, used by the CLI and tests.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Storage error kinds, propagated as tagged variants (no hidden non-local
/// exits cross the core boundary).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Computed hash ≠ expected. Fatal to the operation; nothing persisted.
    #[error("integrity mismatch: expected {expected}, computed {computed}")]
    IntegrityMismatch { expected: String, computed: String },

    /// Write-once violation. `ingest` remaps this to idempotent success.
    #[error("key already exists (immutability enforced): {0}")]
    KeyExists(String),

    /// Path traversal or malformed key. Programming error; surfaced.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Requested key absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed request (chunk bounds, size caps, session state).
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying storage failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<ev_io::IoError> for StoreError {
    fn from(e: ev_io::IoError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub mod audit_log;
pub mod backend;
pub mod casedb;
pub mod evidence_store;
pub mod local_fs;
pub mod memory;
pub mod staging;

pub use backend::{GetOutcome, PutOutcome, StorageBackend};
pub use evidence_store::{EvidenceStore, IngestOutcome};
pub use local_fs::LocalFsStore;
pub use memory::MemoryStore;
