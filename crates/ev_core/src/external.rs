//! External-collaborator contracts consumed by the core.
//!
//! The relational metadata service (cases, evidence links, custody) and the
//! audit sink are black boxes behind these traits. Every query is scoped by
//! tenant; the core never bypasses tenant scoping. Implementations live
//! outside this crate (`ev_store::casedb` ships a single-node JSON-file one).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::envelope::AlgorithmRunRecord;
use crate::ids::{CaseId, EvidenceId, Sha256Hex, TenantId};

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("external service unavailable: {0}")]
    Unavailable(String),
}

/// Minimal case view the core needs for scoping checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    pub title: String,
}

/// Evidence item metadata as the relational service exposes it.
///
/// `db_id` is the relational row key; `evidence_store_id` and `sha256` link
/// back into the content-addressed store when the item has been ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub db_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_store_id: Option<EvidenceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Sha256Hex>,
    pub original_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub is_redacted: bool,
}

/// One chain-of-custody record from the relational service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub evidence_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Narrow interface to the relational metadata service.
pub trait CaseDb: Send + Sync {
    /// Load a case, enforcing tenant scoping. `None` means not found *or*
    /// denied — callers treat both identically.
    fn load_case(
        &self,
        case_id: CaseId,
        tenant_id: TenantId,
    ) -> Result<Option<CaseSummary>, ExternalError>;

    /// Active evidence links for a case, ordered by `db_id`.
    fn list_linked_evidence(&self, case_id: CaseId) -> Result<Vec<EvidenceRef>, ExternalError>;

    /// Custody records for a case, ordered by timestamp ascending.
    /// `since` filters to records at or after the given RFC3339 instant.
    fn list_custody(
        &self,
        case_id: CaseId,
        since: Option<&str>,
    ) -> Result<Vec<CustodyRecord>, ExternalError>;

    /// Persist one run record (never modified afterwards).
    fn store_run_record(&self, record: &AlgorithmRunRecord) -> Result<(), ExternalError>;

    /// Run records for a case ordered by `created_at`; optional filter by
    /// algorithm id.
    fn list_run_records(
        &self,
        case_id: CaseId,
        algorithm_filter: Option<&[String]>,
    ) -> Result<Vec<AlgorithmRunRecord>, ExternalError>;
}

/// Best-effort audit sink. Failures are logged by callers, never propagated
/// to the algorithm caller.
pub trait AuditSink: Send + Sync {
    fn record(
        &self,
        evidence_id: &str,
        action: &str,
        actor_id: Option<u64>,
        actor_name: Option<&str>,
        details: &Value,
    ) -> Result<(), ExternalError>;
}
