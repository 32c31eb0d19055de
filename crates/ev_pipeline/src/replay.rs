//! Deterministic replay harness.
//!
//! Re-runs previously recorded algorithm runs for a case with the exact
//! stored parameters and compares `(result_hash, params_hash,
//! integrity_check)` against the stored values. All hashes match ⇒ provable
//! reproducibility; any difference yields a delta verdict.
//!
//! Replay is non-destructive: contexts run with the replay flag set, so no
//! derivatives are written and no run records are stored. Each replay uses
//! exactly the `(algorithm_id, algorithm_version)` recorded originally; an
//! unregistered pair is an error verdict, never a crash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use ev_core::external::{AuditSink, CaseDb};
use ev_core::ids::{CaseId, TenantId};
use ev_core::time;
use ev_store::EvidenceStore;

use ev_algo::{run_algorithm, AlgoContext, AlgorithmRegistry};

use crate::PipelineError;

/// Comparison result for a single replayed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayVerdict {
    pub original_run_id: String,
    pub algorithm_id: String,
    pub algorithm_version: String,
    pub original_result_hash: String,
    pub replay_result_hash: String,
    #[serde(rename = "match")]
    pub result_match: bool,
    pub original_params_hash: String,
    pub replay_params_hash: String,
    pub params_match: bool,
    pub original_integrity_check: String,
    pub replay_integrity_check: String,
    pub integrity_match: bool,
    pub replay_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub delta_details: BTreeMap<String, Value>,
}

impl ReplayVerdict {
    fn error(record: &ev_core::envelope::AlgorithmRunRecord, message: String) -> Self {
        Self {
            original_run_id: record.run_id.clone(),
            algorithm_id: record.algorithm_id.clone(),
            algorithm_version: record.algorithm_version.clone(),
            original_result_hash: record.result_hash.clone(),
            replay_result_hash: String::new(),
            result_match: false,
            original_params_hash: record.params_hash.clone(),
            replay_params_hash: String::new(),
            params_match: false,
            original_integrity_check: record.integrity_check.clone(),
            replay_integrity_check: String::new(),
            integrity_match: false,
            replay_success: false,
            replay_error: Some(message),
            delta_details: BTreeMap::new(),
        }
    }
}

/// Full replay report for a case, finalized with a deterministic hash over
/// everything but the hash field itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    pub replayed_at: String,
    pub total_runs: u64,
    pub matched: u64,
    pub mismatched: u64,
    pub skipped: u64,
    pub errors: u64,
    pub all_reproducible: bool,
    pub verdicts: Vec<ReplayVerdict>,
    pub report_hash: String,
}

impl ReplayReport {
    fn finalize(&mut self) -> Result<(), PipelineError> {
        let mut value = serde_json::to_value(&*self)?;
        value
            .as_object_mut()
            .expect("report serializes to an object")
            .remove("report_hash");
        self.report_hash = ev_io::hasher::sha256_canonical(&value)?;
        Ok(())
    }
}

/// Replay all successful recorded runs for `(case_id, tenant_id)`,
/// optionally filtered by algorithm id.
pub fn replay_case(
    registry: &AlgorithmRegistry,
    store: &EvidenceStore,
    db: &dyn CaseDb,
    audit: Option<&dyn AuditSink>,
    case_id: CaseId,
    tenant_id: TenantId,
    algorithm_filter: Option<&[String]>,
) -> Result<ReplayReport, PipelineError> {
    let records: Vec<_> = db
        .list_run_records(case_id, algorithm_filter)?
        .into_iter()
        .filter(|r| r.success)
        .collect();

    let replay_ctx = AlgoContext::new(store, db).replay();

    let mut verdicts: Vec<ReplayVerdict> = Vec::new();
    let (mut matched, mut mismatched, mut errors) = (0u64, 0u64, 0u64);

    for record in &records {
        let Some(algorithm) = registry.get(&record.algorithm_id, Some(&record.algorithm_version))
        else {
            errors += 1;
            verdicts.push(ReplayVerdict::error(
                record,
                format!(
                    "Algorithm {} v{} not found in registry.",
                    record.algorithm_id, record.algorithm_version
                ),
            ));
            continue;
        };

        let result = run_algorithm(algorithm.as_ref(), &record.params, &replay_ctx, None)?;

        if !result.success {
            errors += 1;
            verdicts.push(ReplayVerdict::error(
                record,
                result.error.unwrap_or_else(|| "replay run failed".into()),
            ));
            continue;
        }

        let result_match = record.result_hash == result.result_hash;
        let params_match = record.params_hash == result.params_hash;
        let integrity_match = record.integrity_check == result.integrity_check;

        let mut delta = BTreeMap::new();
        if !result_match {
            delta.insert("result_hash_original".into(), json!(record.result_hash));
            delta.insert("result_hash_replay".into(), json!(result.result_hash));
        }
        if !params_match {
            delta.insert("params_hash_original".into(), json!(record.params_hash));
            delta.insert("params_hash_replay".into(), json!(result.params_hash));
        }
        if !integrity_match {
            delta.insert("integrity_original".into(), json!(record.integrity_check));
            delta.insert("integrity_replay".into(), json!(result.integrity_check));
        }

        if result_match {
            matched += 1;
        } else {
            mismatched += 1;
        }

        verdicts.push(ReplayVerdict {
            original_run_id: record.run_id.clone(),
            algorithm_id: record.algorithm_id.clone(),
            algorithm_version: record.algorithm_version.clone(),
            original_result_hash: record.result_hash.clone(),
            replay_result_hash: result.result_hash,
            result_match,
            original_params_hash: record.params_hash.clone(),
            replay_params_hash: result.params_hash,
            params_match,
            original_integrity_check: record.integrity_check.clone(),
            replay_integrity_check: result.integrity_check,
            integrity_match,
            replay_success: result.success,
            replay_error: None,
            delta_details: delta,
        });
    }

    let mut report = ReplayReport {
        case_id,
        tenant_id,
        replayed_at: time::now_utc_string(),
        total_runs: records.len() as u64,
        matched,
        mismatched,
        skipped: 0,
        errors,
        all_reproducible: mismatched == 0 && errors == 0,
        verdicts,
        report_hash: String::new(),
    };
    report.finalize()?;

    if let Some(sink) = audit {
        let details = json!({
            "case_id": case_id,
            "tenant_id": tenant_id,
            "total_runs": report.total_runs,
            "matched": report.matched,
            "mismatched": report.mismatched,
            "errors": report.errors,
            "all_reproducible": report.all_reproducible,
            "report_hash": report.report_hash,
        });
        if let Err(e) = sink.record(
            &case_id.to_string(),
            "replay.completed",
            None,
            Some("replay_engine"),
            &details,
        ) {
            warn!(error = %e, "failed to emit replay audit");
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev_core::envelope::{AlgorithmParams, AlgorithmRunRecord};

    #[test]
    fn report_hash_excludes_itself_and_is_deterministic() {
        let mut report = ReplayReport {
            case_id: CaseId(1),
            tenant_id: TenantId(1),
            replayed_at: "2026-02-10T12:00:00.000000Z".into(),
            total_runs: 0,
            matched: 0,
            mismatched: 0,
            skipped: 0,
            errors: 0,
            all_reproducible: true,
            verdicts: vec![],
            report_hash: String::new(),
        };
        report.finalize().unwrap();
        let first = report.report_hash.clone();
        report.finalize().unwrap();
        assert_eq!(report.report_hash, first);
        assert!(ev_io::hasher::is_hex64(&first));
    }

    #[test]
    fn error_verdict_shape() {
        let record = AlgorithmRunRecord {
            run_id: "r1".into(),
            case_id: CaseId(1),
            tenant_id: TenantId(1),
            algorithm_id: "ghost".into(),
            algorithm_version: "9.9.9".into(),
            params: AlgorithmParams::new(CaseId(1), TenantId(1)),
            params_hash: "p".into(),
            result_hash: "r".into(),
            integrity_check: "i".into(),
            success: true,
            created_at: "2026-02-10T12:00:00.000000Z".into(),
        };
        let verdict = ReplayVerdict::error(&record, "Algorithm ghost v9.9.9 not found in registry.".into());
        assert!(!verdict.result_match && !verdict.params_match && !verdict.integrity_match);
        assert!(verdict.replay_error.as_deref().unwrap().contains("not found"));
        let v = serde_json::to_value(&verdict).unwrap();
        assert_eq!(v["match"], false);
    }
}
