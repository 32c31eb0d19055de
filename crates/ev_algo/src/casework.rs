//! Shared case-scoping helpers used by every algorithm.

use ev_core::envelope::AlgorithmParams;
use ev_core::external::{CaseSummary, EvidenceRef};

use crate::{AlgoContext, AlgoError};

/// Load the case with tenant isolation; absence (or denial — callers cannot
/// tell the difference) fails the run.
pub fn require_case(
    params: &AlgorithmParams,
    ctx: &AlgoContext<'_>,
) -> Result<CaseSummary, AlgoError> {
    ctx.db
        .load_case(params.case_id, params.tenant_id)?
        .ok_or(AlgoError::CaseNotFoundOrDenied {
            case_id: params.case_id,
            tenant_id: params.tenant_id,
        })
}

/// Evidence linked to the case, in stable `db_id` order.
pub fn linked_items(
    params: &AlgorithmParams,
    ctx: &AlgoContext<'_>,
) -> Result<Vec<EvidenceRef>, AlgoError> {
    let mut items = ctx.db.list_linked_evidence(params.case_id)?;
    items.sort_by_key(|e| e.db_id);
    Ok(items)
}

/// The audit-stream identifier for an item: the evidence-store id when the
/// item has been ingested, the relational row id otherwise.
pub fn audit_id(item: &EvidenceRef) -> String {
    item.evidence_store_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| item.db_id.to_string())
}
