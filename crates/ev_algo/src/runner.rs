//! The run protocol: provenance capture around `Algorithm::execute`.
//!
//! For each run: mint a UUID run id, record `started_at`, hash canonical
//! params, execute, record timing, hash the canonical payload, compute the
//! self-verifying integrity check, and emit one audit entry.
//!
//! The integrity basis covers every reproducible field — identity, hashes,
//! payload, status, warnings — and excludes the per-run volatile fields
//! (`run_id`, `started_at`, `completed_at`, `duration_seconds`) alongside
//! `integrity_check` itself, so a faithful replay of unchanged state
//! reproduces the check bit-for-bit.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::error;

use ev_core::envelope::{AlgorithmParams, AlgorithmResult, AlgorithmRunRecord};
use ev_core::external::CaseDb;
use ev_core::time;

use crate::{AlgoContext, AlgoError, Algorithm};

const INTEGRITY_EXCLUDED_FIELDS: [&str; 5] = [
    "integrity_check",
    "run_id",
    "started_at",
    "completed_at",
    "duration_seconds",
];

/// Execute an algorithm with full provenance tracking. Framework-level
/// failures (case denied, validation) produce a result with
/// `success = false`; they do not surface as `Err`. `Err` is reserved for
/// canonicalization failures, which indicate a malformed payload type.
pub fn run_algorithm(
    algorithm: &dyn Algorithm,
    params: &AlgorithmParams,
    ctx: &AlgoContext<'_>,
    input_hashes: Option<Vec<String>>,
) -> Result<AlgorithmResult, AlgoError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let started = Utc::now();

    let params_hash = ev_io::hasher::sha256_canonical(params)?;

    let mut result = AlgorithmResult {
        algorithm_id: algorithm.id().to_string(),
        algorithm_version: algorithm.version().to_string(),
        run_id,
        input_hashes: input_hashes.unwrap_or_default(),
        output_hashes: Vec::new(),
        params_hash,
        result_hash: String::new(),
        payload: Value::Object(Default::default()),
        started_at: time::format_utc(started),
        completed_at: String::new(),
        duration_seconds: 0.0,
        success: true,
        error: None,
        warnings: Vec::new(),
        integrity_check: String::new(),
    };

    match algorithm.execute(params, ctx) {
        Ok(output) => {
            result.payload = output.payload;
            result.output_hashes = output.output_hashes;
            if result.input_hashes.is_empty() {
                result.input_hashes = output.input_hashes;
            }
            result.warnings = output.warnings;
            result.success = true;
        }
        Err(exc) => {
            error!(
                algorithm_id = algorithm.id(),
                version = algorithm.version(),
                run_id = %result.run_id,
                error = %exc,
                "algorithm run failed"
            );
            result.success = false;
            result.error = Some(exc.to_string());
        }
    }

    let completed = Utc::now();
    result.completed_at = time::format_utc(completed);
    let duration = (completed - started).num_microseconds().unwrap_or(0) as f64 / 1e6;
    result.duration_seconds = (duration * 10_000.0).round() / 10_000.0;
    result.result_hash = ev_io::hasher::sha256_canonical(&result.payload)?;
    result.integrity_check = integrity_check_of(&result)?;

    emit_run_audit(&result, params, ctx);

    Ok(result)
}

/// Run and persist the run record (skipped in replay mode — replay is
/// non-destructive).
pub fn run_and_record(
    algorithm: &dyn Algorithm,
    params: &AlgorithmParams,
    ctx: &AlgoContext<'_>,
) -> Result<AlgorithmResult, AlgoError> {
    let result = run_algorithm(algorithm, params, ctx, None)?;
    if !ctx.replay_mode {
        ctx.db
            .store_run_record(&AlgorithmRunRecord::from_result(&result, params))?;
    }
    Ok(result)
}

/// Compute the self-verifying hash over the result's reproducible fields.
pub fn integrity_check_of(result: &AlgorithmResult) -> Result<String, AlgoError> {
    let mut value = serde_json::to_value(result)?;
    let map = value
        .as_object_mut()
        .ok_or_else(|| AlgoError::Validation("result must serialize to an object".into()))?;
    for field in INTEGRITY_EXCLUDED_FIELDS {
        map.remove(field);
    }
    Ok(ev_io::hasher::sha256_canonical(&value)?)
}

/// True iff the stored `integrity_check` matches a recomputation.
pub fn verify_integrity(result: &AlgorithmResult) -> bool {
    integrity_check_of(result)
        .map(|h| h == result.integrity_check)
        .unwrap_or(false)
}

fn emit_run_audit(result: &AlgorithmResult, params: &AlgorithmParams, ctx: &AlgoContext<'_>) {
    let action = if result.success {
        "algorithm.completed"
    } else {
        "algorithm.failed"
    };
    let mut details = json!({
        "algorithm_id": result.algorithm_id,
        "algorithm_version": result.algorithm_version,
        "run_id": result.run_id,
        "params_hash": result.params_hash,
        "result_hash": result.result_hash,
        "integrity_check": result.integrity_check,
        "duration_seconds": result.duration_seconds,
        "input_count": result.input_hashes.len(),
        "output_count": result.output_hashes.len(),
    });
    if let Some(err) = &result.error {
        details["error"] = json!(err);
    }
    ctx.emit_audit(
        &params.case_id.to_string(),
        action,
        params.actor_id,
        params.actor_name.as_deref(),
        &details,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlgorithmOutput;
    use ev_core::ids::{CaseId, TenantId};
    use ev_store::{EvidenceStore, MemoryStore};
    use std::sync::Arc;

    struct Fixed;

    impl Algorithm for Fixed {
        fn id(&self) -> &'static str {
            "fixed"
        }
        fn version(&self) -> &'static str {
            "1.0.0"
        }
        fn description(&self) -> &'static str {
            "returns a constant payload"
        }
        fn execute(
            &self,
            _params: &AlgorithmParams,
            _ctx: &AlgoContext<'_>,
        ) -> Result<AlgorithmOutput, AlgoError> {
            Ok(AlgorithmOutput {
                payload: json!({"answer": 42, "output_hashes": []}),
                input_hashes: vec!["a".repeat(64)],
                output_hashes: vec![],
                warnings: vec![],
            })
        }
    }

    struct Failing;

    impl Algorithm for Failing {
        fn id(&self) -> &'static str {
            "failing"
        }
        fn version(&self) -> &'static str {
            "1.0.0"
        }
        fn description(&self) -> &'static str {
            "always fails"
        }
        fn execute(
            &self,
            params: &AlgorithmParams,
            _ctx: &AlgoContext<'_>,
        ) -> Result<AlgorithmOutput, AlgoError> {
            Err(AlgoError::CaseNotFoundOrDenied {
                case_id: params.case_id,
                tenant_id: params.tenant_id,
            })
        }
    }

    fn fixtures() -> (EvidenceStore, ev_store::casedb::JsonCaseDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::new(Arc::new(MemoryStore::new()));
        let db = ev_store::casedb::JsonCaseDb::open(dir.path().join("db")).unwrap();
        (store, db, dir)
    }

    #[test]
    fn deterministic_hashes_across_runs() {
        let (store, db, _dir) = fixtures();
        let ctx = AlgoContext::new(&store, &db);
        let params = AlgorithmParams::new(CaseId(1), TenantId(1));
        let a = run_algorithm(&Fixed, &params, &ctx, None).unwrap();
        let b = run_algorithm(&Fixed, &params, &ctx, None).unwrap();
        assert_eq!(a.result_hash, b.result_hash);
        assert_eq!(a.params_hash, b.params_hash);
        assert_eq!(a.integrity_check, b.integrity_check);
        assert_ne!(a.run_id, b.run_id);
        assert!(verify_integrity(&a));
    }

    #[test]
    fn params_change_changes_params_hash_only() {
        let (store, db, _dir) = fixtures();
        let ctx = AlgoContext::new(&store, &db);
        let p1 = AlgorithmParams::new(CaseId(1), TenantId(1));
        let p2 = AlgorithmParams::new(CaseId(2), TenantId(1));
        let a = run_algorithm(&Fixed, &p1, &ctx, None).unwrap();
        let b = run_algorithm(&Fixed, &p2, &ctx, None).unwrap();
        assert_ne!(a.params_hash, b.params_hash);
        assert_eq!(a.result_hash, b.result_hash);
    }

    #[test]
    fn failure_produces_clean_unsuccessful_result() {
        let (store, db, _dir) = fixtures();
        let ctx = AlgoContext::new(&store, &db);
        let params = AlgorithmParams::new(CaseId(1), TenantId(9));
        let result = run_algorithm(&Failing, &params, &ctx, None).unwrap();
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("not found or access denied"));
        assert!(verify_integrity(&result));
    }

    #[test]
    fn tampered_payload_fails_integrity() {
        let (store, db, _dir) = fixtures();
        let ctx = AlgoContext::new(&store, &db);
        let params = AlgorithmParams::new(CaseId(1), TenantId(1));
        let mut result = run_algorithm(&Fixed, &params, &ctx, None).unwrap();
        result.payload["answer"] = json!(43);
        assert!(!verify_integrity(&result));
    }

    #[test]
    fn run_and_record_persists_unless_replaying() {
        let (store, db, _dir) = fixtures();
        let params = AlgorithmParams::new(CaseId(5), TenantId(1));

        let ctx = AlgoContext::new(&store, &db);
        run_and_record(&Fixed, &params, &ctx).unwrap();
        assert_eq!(db.list_run_records(CaseId(5), None).unwrap().len(), 1);

        let replay_ctx = AlgoContext::new(&store, &db).replay();
        run_and_record(&Fixed, &params, &replay_ctx).unwrap();
        assert_eq!(db.list_run_records(CaseId(5), None).unwrap().len(), 1);
    }
}
