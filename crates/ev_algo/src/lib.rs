//! ev_algo — the algorithm framework.
//!
//! Defines the contract every registered algorithm satisfies:
//!   1. Declares a unique `(algorithm_id, version)` pair.
//!   2. Accepts typed, canonicalizable parameters (`AlgorithmParams`).
//!   3. Returns an `AlgorithmResult` with full provenance metadata.
//!   4. Is deterministic: same inputs + params ⇒ identical result hash.
//!   5. Emits audit events through the context's `AuditSink`.
//!
//! Determinism requirement for `execute` implementations: no wall clock
//! into the payload, no RNG, no unordered iteration, no network, no locale.
//! Reference times come from input data or params.

#![forbid(unsafe_code)]

use serde_json::Value;
use thiserror::Error;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::{CaseId, TenantId};

pub mod algorithms;
pub mod casework;
pub mod codec;
pub mod context;
pub mod registry;
pub mod runner;

pub use codec::{PdfCodec, StampPosition};
pub use context::AlgoContext;
pub use registry::AlgorithmRegistry;
pub use runner::{integrity_check_of, run_algorithm, run_and_record, verify_integrity};

/// Framework error kinds. Per-item IO trouble never surfaces here — it is
/// recorded inside payloads as warnings or skipped-item reasons; these
/// variants fail the run cleanly.
#[derive(Debug, Error)]
pub enum AlgoError {
    #[error("case {case_id} not found or access denied for tenant {tenant_id}")]
    CaseNotFoundOrDenied { case_id: CaseId, tenant_id: TenantId },

    #[error("algorithm not registered: {id} v{version}")]
    NotRegistered { id: String, version: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("registry is frozen; no further registration permitted")]
    RegistryFrozen,

    #[error("store error: {0}")]
    Store(#[from] ev_store::StoreError),

    #[error("external service error: {0}")]
    External(#[from] ev_core::external::ExternalError),

    #[error("serialization error: {0}")]
    Serialization(#[from] ev_io::IoError),
}

impl From<serde_json::Error> for AlgoError {
    fn from(e: serde_json::Error) -> Self {
        AlgoError::Serialization(ev_io::IoError::Json(e.to_string()))
    }
}

/// What `execute` hands back to the framework. The payload is the typed
/// report serialized through the canonicalizer; `output_hashes` always
/// contains at least the hash of the report itself.
#[derive(Debug, Clone)]
pub struct AlgorithmOutput {
    pub payload: Value,
    pub input_hashes: Vec<String>,
    pub output_hashes: Vec<String>,
    pub warnings: Vec<String>,
}

/// The algorithm contract. Concrete algorithms are plain structs held as
/// trait objects in the registry.
pub trait Algorithm: Send + Sync {
    /// Unique algorithm identifier (lowercase, underscored).
    fn id(&self) -> &'static str;

    /// Semantic version of this implementation.
    fn version(&self) -> &'static str;

    /// One-line human-readable description.
    fn description(&self) -> &'static str;

    /// The deterministic core. Must be a pure function of
    /// (params, relevant store/db state).
    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError>;
}
