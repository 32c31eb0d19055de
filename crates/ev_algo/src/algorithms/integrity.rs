//! Integrity verification sweep.
//!
//! Recomputes the SHA-256 of every stored original against the recorded
//! hash. Detects missing objects and hash mismatches; never modifies
//! evidence or manifests. Emits a per-item audit event, pass or fail.

use serde::Serialize;
use serde_json::json;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::CaseId;

use crate::casework::{audit_id, linked_items, require_case};
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

pub const STATUS_PASS: &str = "pass";
pub const STATUS_FAIL: &str = "fail";
pub const STATUS_MISSING: &str = "missing";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Serialize)]
struct ItemCheck {
    evidence_id: u64,
    original_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    computed_hash: Option<String>,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Default, Serialize)]
struct SweepSummary {
    pass: u64,
    fail: u64,
    missing: u64,
    error: u64,
}

#[derive(Debug, Serialize)]
struct SweepReport {
    case_id: CaseId,
    total_items: u64,
    summary: SweepSummary,
    all_passed: bool,
    items: Vec<ItemCheck>,
}

pub struct IntegritySweep;

impl Algorithm for IntegritySweep {
    fn id(&self) -> &'static str {
        "integrity_sweep"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Verify stored hashes against recomputed hashes for all case evidence."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;
        let items = linked_items(params, ctx)?;

        let mut results: Vec<ItemCheck> = Vec::new();
        let mut input_hashes: Vec<String> = Vec::new();
        let mut summary = SweepSummary::default();

        for item in &items {
            let Some(expected) = &item.sha256 else {
                summary.error += 1;
                results.push(ItemCheck {
                    evidence_id: item.db_id,
                    original_filename: item.original_filename.clone(),
                    expected_hash: None,
                    computed_hash: None,
                    status: STATUS_ERROR,
                    detail: "No sha256 recorded for this item.".to_string(),
                });
                continue;
            };
            input_hashes.push(expected.as_str().to_string());

            let (status, computed, detail) = match ctx.store.read_original(expected) {
                Ok(Some(found)) => {
                    if found.sha256 == expected.as_str() {
                        summary.pass += 1;
                        (STATUS_PASS, Some(found.sha256), String::new())
                    } else {
                        summary.fail += 1;
                        (
                            STATUS_FAIL,
                            Some(found.sha256),
                            "Recomputed hash differs from recorded hash.".to_string(),
                        )
                    }
                }
                Ok(None) => {
                    summary.missing += 1;
                    (
                        STATUS_MISSING,
                        None,
                        "Original not found in evidence store.".to_string(),
                    )
                }
                Err(e) => {
                    summary.error += 1;
                    (STATUS_ERROR, None, e.to_string())
                }
            };

            let action = if status == STATUS_PASS {
                "integrity_verified"
            } else {
                "integrity_failed"
            };
            ctx.emit_audit(
                &audit_id(item),
                action,
                params.actor_id,
                params.actor_name.as_deref(),
                &json!({
                    "expected_hash": expected.as_str(),
                    "computed_hash": computed,
                    "status": status,
                }),
            );

            results.push(ItemCheck {
                evidence_id: item.db_id,
                original_filename: item.original_filename.clone(),
                expected_hash: Some(expected.as_str().to_string()),
                computed_hash: computed,
                status,
                detail,
            });
        }

        let report = SweepReport {
            case_id: params.case_id,
            total_items: items.len() as u64,
            all_passed: summary.fail == 0 && summary.missing == 0 && summary.error == 0,
            summary,
            items: results,
        };

        super::report_output(&report, "report_hash", input_hashes, Vec::new(), Vec::new())
    }
}
