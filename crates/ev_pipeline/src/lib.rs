//! ev_pipeline — orchestration over the algorithm framework.
//!
//! - `replay`: re-executes recorded algorithm runs against stored evidence
//!   and verifies byte-for-byte hash equivalence.
//! - `sealed_export`: runs the export algorithm set, collects artifacts,
//!   and binds everything into a ZIP sealed by `SEAL.json` + `SEAL_HASH.txt`.
//! - `versions`: the frozen algorithm version manifest with module source
//!   hashes.

#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("algorithm framework error: {0}")]
    Algo(#[from] ev_algo::AlgoError),

    #[error("store error: {0}")]
    Store(#[from] ev_store::StoreError),

    #[error("external service error: {0}")]
    External(#[from] ev_core::external::ExternalError),

    #[error("serialization error: {0}")]
    Serialization(#[from] ev_io::IoError),

    #[error("archive error: {0}")]
    Archive(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Archive(e.to_string())
    }
}

impl From<zip::result::ZipError> for PipelineError {
    fn from(e: zip::result::ZipError) -> Self {
        PipelineError::Archive(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(ev_io::IoError::Json(e.to_string()))
    }
}

pub mod replay;
pub mod sealed_export;
pub mod versions;

pub use replay::{replay_case, ReplayReport, ReplayVerdict};
pub use sealed_export::{
    build_sealed_package, verify_sealed_package, ExportConfig, SealDocument, SealVerification,
    SealedPackageOutcome,
};
pub use versions::{version_manifest, VersionManifest};
