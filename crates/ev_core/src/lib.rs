//! ev_core — Core types for the evidence processing core.
//!
//! This crate is **I/O-free**. It defines the stable types and trait seams
//! used across the workspace (`ev_io`, `ev_store`, `ev_algo`, `ev_pipeline`,
//! `ev_report`, `ev_cli`):
//!
//! - Identifier newtypes: `Sha256Hex`, `EvidenceId`, `CaseId`, `TenantId`
//! - Evidence entities: manifest, ingest/derivative descriptors, audit entries
//! - Algorithm envelopes: `AlgorithmParams`, `AlgorithmResult`, run records
//! - External-collaborator traits: `CaseDb`, `AuditSink`
//! - RFC3339 UTC timestamp helpers

#![forbid(unsafe_code)]

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod external;
pub mod ids;
pub mod time;

pub use errors::CoreError;

/// Lightweight re-exports so downstream crates can do `use ev_core::prelude::*;`.
pub mod prelude {
    pub use crate::entities::{AuditEntry, DerivativeDescriptor, EvidenceManifest, IngestDescriptor, ProvenanceEdge};
    pub use crate::envelope::{AlgorithmParams, AlgorithmResult, AlgorithmRunRecord};
    pub use crate::errors::CoreError;
    pub use crate::external::{AuditSink, CaseDb, CaseSummary, CustodyRecord, EvidenceRef, ExternalError};
    pub use crate::ids::{CaseId, EvidenceId, Sha256Hex, TenantId};
}
