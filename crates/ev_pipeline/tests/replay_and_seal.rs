//! Replay stability and seal verification round-trips.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use ev_algo::registry::builtin_registry;
use ev_algo::{run_and_record, AlgoContext};
use ev_core::envelope::AlgorithmParams;
use ev_core::external::{CaseDb, CaseSummary, EvidenceRef};
use ev_core::ids::{CaseId, TenantId};
use ev_pipeline::{build_sealed_package, replay_case, verify_sealed_package, ExportConfig};
use ev_report::statement::IntegrityStatement;
use ev_store::audit_log::JsonAuditLog;
use ev_store::casedb::JsonCaseDb;
use ev_store::{EvidenceStore, LocalFsStore};

const CASE: CaseId = CaseId(7);
const TENANT: TenantId = TenantId(1);

struct Fixture {
    store: EvidenceStore,
    db: JsonCaseDb,
    dir: tempfile::TempDir,
    next_db_id: u64,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store =
            EvidenceStore::new(Arc::new(LocalFsStore::open(dir.path().join("store")).unwrap()));
        let db = JsonCaseDb::open(dir.path().join("db")).unwrap();
        db.upsert_case(&CaseSummary {
            case_id: CASE,
            tenant_id: TENANT,
            title: "Replay fixture".into(),
        })
        .unwrap();
        Self {
            store,
            db,
            dir,
            next_db_id: 1,
        }
    }

    fn ingest(&mut self, bytes: &[u8], filename: &str) -> EvidenceRef {
        let outcome = self
            .store
            .ingest(&mut &bytes[..], filename, "text/plain", "uploader", None, None)
            .unwrap();
        let db_id = self.next_db_id;
        self.next_db_id += 1;
        let item = EvidenceRef {
            db_id,
            evidence_store_id: Some(outcome.evidence_id.clone()),
            sha256: Some(outcome.sha256.clone()),
            original_filename: filename.to_string(),
            file_type: Some("txt".to_string()),
            file_size_bytes: Some(outcome.size_bytes),
            collected_date: None,
            created_at: None,
            device_label: None,
            device_type: None,
            duration_seconds: None,
            is_redacted: false,
        };
        self.db.link_evidence(CASE, &item).unwrap();
        item
    }

    fn params(&self) -> AlgorithmParams {
        AlgorithmParams::new(CASE, TENANT).with_actor(None, "pipeline")
    }
}

#[test]
fn replay_reproduces_unchanged_state() {
    let mut fx = Fixture::new();
    fx.ingest(b"AAA", "a.txt");
    fx.ingest(b"AAA", "a_copy.txt");
    fx.ingest(b"BBB", "b.txt");

    let registry = builtin_registry();
    let ctx = AlgoContext::new(&fx.store, &fx.db);
    let params = fx.params();
    let original = run_and_record(
        registry.get("bulk_dedup", None).unwrap().as_ref(),
        &params,
        &ctx,
    )
    .unwrap();
    run_and_record(
        registry.get("integrity_sweep", None).unwrap().as_ref(),
        &params,
        &ctx,
    )
    .unwrap();

    let report =
        replay_case(&registry, &fx.store, &fx.db, None, CASE, TENANT, None).unwrap();

    assert_eq!(report.total_runs, 2);
    assert_eq!(report.matched, 2);
    assert_eq!(report.mismatched, 0);
    assert_eq!(report.errors, 0);
    assert!(report.all_reproducible);
    for verdict in &report.verdicts {
        assert!(verdict.result_match);
        assert!(verdict.params_match);
        assert!(verdict.integrity_match);
        assert!(verdict.delta_details.is_empty());
    }
    let dedup_verdict = report
        .verdicts
        .iter()
        .find(|v| v.algorithm_id == "bulk_dedup")
        .unwrap();
    assert_eq!(dedup_verdict.replay_result_hash, original.result_hash);
}

#[test]
fn replay_detects_tampered_store() {
    let mut fx = Fixture::new();
    let item = fx.ingest(b"pristine", "p.txt");

    let registry = builtin_registry();
    let ctx = AlgoContext::new(&fx.store, &fx.db);
    run_and_record(
        registry.get("integrity_sweep", None).unwrap().as_ref(),
        &fx.params(),
        &ctx,
    )
    .unwrap();

    let path = fx
        .store
        .get_original_path(item.sha256.as_ref().unwrap())
        .unwrap()
        .unwrap();
    std::fs::write(&path, b"tampered").unwrap();

    let report =
        replay_case(&registry, &fx.store, &fx.db, None, CASE, TENANT, None).unwrap();
    assert_eq!(report.mismatched, 1);
    assert!(!report.all_reproducible);
    let verdict = &report.verdicts[0];
    assert!(!verdict.result_match);
    assert!(!verdict.integrity_match);
    assert!(verdict.delta_details.contains_key("result_hash_original"));
}

#[test]
fn replay_flags_unregistered_algorithm() {
    let fx = Fixture::new();
    // Record a run that references an algorithm the registry never saw.
    let record = ev_core::envelope::AlgorithmRunRecord {
        run_id: "r-ghost".into(),
        case_id: CASE,
        tenant_id: TENANT,
        algorithm_id: "ghost_analysis".into(),
        algorithm_version: "2.0.0".into(),
        params: fx.params(),
        params_hash: "p".into(),
        result_hash: "r".into(),
        integrity_check: "i".into(),
        success: true,
        created_at: "2026-02-10T12:00:00.000000Z".into(),
    };
    fx.db.store_run_record(&record).unwrap();

    let registry = builtin_registry();
    let report =
        replay_case(&registry, &fx.store, &fx.db, None, CASE, TENANT, None).unwrap();
    assert_eq!(report.errors, 1);
    assert!(!report.all_reproducible);
    assert!(report.verdicts[0]
        .replay_error
        .as_deref()
        .unwrap()
        .contains("not found in registry"));
}

#[test]
fn replay_respects_algorithm_filter() {
    let mut fx = Fixture::new();
    fx.ingest(b"AAA", "a.txt");
    let registry = builtin_registry();
    let ctx = AlgoContext::new(&fx.store, &fx.db);
    let params = fx.params();
    for id in ["bulk_dedup", "integrity_sweep"] {
        run_and_record(registry.get(id, None).unwrap().as_ref(), &params, &ctx).unwrap();
    }
    let filter = vec!["bulk_dedup".to_string()];
    let report =
        replay_case(&registry, &fx.store, &fx.db, None, CASE, TENANT, Some(&filter)).unwrap();
    assert_eq!(report.total_runs, 1);
    assert_eq!(report.verdicts[0].algorithm_id, "bulk_dedup");
}

#[test]
fn sealed_package_round_trips_verification() {
    let mut fx = Fixture::new();
    fx.ingest(b"AAA", "a.txt");
    fx.ingest(b"evidence body", "b.txt");

    let registry = builtin_registry();
    let audit = JsonAuditLog::open(fx.dir.path().join("audit.jsonl")).unwrap();
    let generated_at = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
    let outcome = build_sealed_package(
        &registry,
        &fx.store,
        &fx.db,
        Some(&audit),
        None,
        CASE,
        TENANT,
        None,
        "export_test",
        generated_at,
        &ExportConfig::new(fx.dir.path().join("exports")),
    )
    .unwrap();

    assert!(outcome.package_path.exists());
    assert!(outcome
        .package_path
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("sealed_court_package_case_7_20260210_120000"));
    assert_eq!(outcome.algorithms_run.len(), 6);

    // Independent verification: every listed hash agrees, and the seal's
    // own hash agrees with SEAL_HASH.txt.
    let verification = verify_sealed_package(&outcome.package_path).unwrap();
    assert!(verification.seal_hash_ok);
    assert!(verification.files_ok, "mismatched: {:?}", verification.mismatched_files);
    assert!(verification.intact());

    // The audit sink saw the algorithm runs and the sealed export.
    let lines = audit.read_all().unwrap();
    assert!(lines.iter().any(|l| l.action == "export.sealed"));
    assert!(lines.iter().any(|l| l.action == "algorithm.completed"));

    // Run records were stored for every export-set algorithm, so a replay
    // can re-drive the whole case.
    assert_eq!(fx.db.list_run_records(CASE, None).unwrap().len(), 6);
}

#[test]
fn sealed_package_statement_self_verifies() {
    let mut fx = Fixture::new();
    fx.ingest(b"AAA", "a.txt");

    let registry = builtin_registry();
    let generated_at = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
    let outcome = build_sealed_package(
        &registry,
        &fx.store,
        &fx.db,
        None,
        None,
        CASE,
        TENANT,
        None,
        "export_test",
        generated_at,
        &ExportConfig::new(fx.dir.path().join("exports")),
    )
    .unwrap();

    let file = std::fs::File::open(&outcome.package_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut statement_text = String::new();
    std::io::Read::read_to_string(
        &mut archive.by_name("INTEGRITY_STATEMENT.txt").unwrap(),
        &mut statement_text,
    )
    .unwrap();
    assert!(IntegrityStatement::verify_text(&statement_text));
    assert!(statement_text.contains("Scope Identifier: CASE-7"));
}

#[test]
fn failed_algorithm_is_captured_not_fatal() {
    // No case row at all: every algorithm fails with case-denied, but the
    // seal is still produced and verifiable.
    let dir = tempfile::tempdir().unwrap();
    let store =
        EvidenceStore::new(Arc::new(LocalFsStore::open(dir.path().join("store")).unwrap()));
    let db = JsonCaseDb::open(dir.path().join("db")).unwrap();
    let registry = builtin_registry();
    let generated_at = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();

    let outcome = build_sealed_package(
        &registry,
        &store,
        &db,
        None,
        None,
        CaseId(99),
        TENANT,
        None,
        "export_test",
        generated_at,
        &ExportConfig::new(dir.path().join("exports")),
    )
    .unwrap();

    let verification = verify_sealed_package(&outcome.package_path).unwrap();
    assert!(verification.intact());

    // The reports record the failures.
    let file = std::fs::File::open(&outcome.package_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut report_bytes = Vec::new();
    std::io::Read::read_to_end(
        &mut archive.by_name("reports/integrity_sweep_report.json").unwrap(),
        &mut report_bytes,
    )
    .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&report_bytes).unwrap();
    assert_eq!(report["success"], false);
}
