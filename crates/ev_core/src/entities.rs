//! Evidence entities: manifests, descriptors, audit entries, provenance edges.
//!
//! The manifest is the only mutable structure in the core and it mutates
//! append-only: derivatives and audit entries are pushed, never rewritten.
//! All maps are `BTreeMap` so canonical serialization is order-free.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{EvidenceId, Sha256Hex};
use crate::time;

/// Descriptor of the original ingest, fixed at first ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDescriptor {
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: Sha256Hex,
    pub ingested_at: String,
    pub ingested_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
}

/// A derivative produced by an algorithm run. References exactly one
/// original by hash; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeDescriptor {
    pub derivative_type: String,
    pub filename: String,
    pub sha256: Sha256Hex,
    pub size_bytes: u64,
    pub created_at: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

/// One append-only audit record inside a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub action: String,
    pub actor: String,
    #[serde(default)]
    pub details: Value,
}

/// Per-identity record: ingest descriptor + ordered derivatives + audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceManifest {
    pub evidence_id: EvidenceId,
    pub ingest: IngestDescriptor,
    #[serde(default)]
    pub derivatives: Vec<DerivativeDescriptor>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl EvidenceManifest {
    pub fn new(evidence_id: EvidenceId, ingest: IngestDescriptor) -> Self {
        Self {
            evidence_id,
            ingest,
            derivatives: Vec::new(),
            audit: Vec::new(),
        }
    }

    /// Append an audit entry whose timestamp is clamped to
    /// `max(now, last_entry_timestamp)` so the sequence never decreases.
    pub fn append_audit(&mut self, action: &str, actor: &str, details: Value) -> &AuditEntry {
        let now = time::now_utc_string();
        let timestamp = match self.audit.last() {
            Some(last) if last.timestamp.as_str() > now.as_str() => last.timestamp.clone(),
            _ => now,
        };
        self.audit.push(AuditEntry {
            timestamp,
            action: action.to_string(),
            actor: actor.to_string(),
            details,
        });
        self.audit.last().expect("just pushed")
    }

    /// Append a derivative descriptor. Insertion order is the persisted order.
    pub fn append_derivative(&mut self, descriptor: DerivativeDescriptor) {
        self.derivatives.push(descriptor);
    }

    /// Locate a derivative by type, first match in insertion order.
    pub fn find_derivative(&self, derivative_type: &str) -> Option<&DerivativeDescriptor> {
        self.derivatives
            .iter()
            .find(|d| d.derivative_type == derivative_type)
    }
}

/// Directed edge in the provenance DAG: `source_hash → target_hash` via a
/// named transformation, attributed to an algorithm run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEdge {
    pub source_hash: Sha256Hex,
    pub target_hash: Sha256Hex,
    pub transformation: String,
    pub algorithm_id: String,
    pub algorithm_version: String,
    pub run_id: String,
    pub created_at: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl ProvenanceEdge {
    /// Link `source` to `target` under a named transformation, stamped now.
    pub fn link(
        source_hash: Sha256Hex,
        target_hash: Sha256Hex,
        transformation: &str,
        algorithm_id: &str,
        algorithm_version: &str,
        run_id: &str,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            source_hash,
            target_hash,
            transformation: transformation.to_string(),
            algorithm_id: algorithm_id.to_string(),
            algorithm_version: algorithm_version.to_string(),
            run_id: run_id.to_string(),
            created_at: time::now_utc_string(),
            parameters,
        }
    }
}
