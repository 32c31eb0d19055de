//! Integrity-sealed court package export.
//!
//! One call → one sealed ZIP containing every forensic artifact for a case:
//! algorithm reports, the frozen version manifest, human-readable digests,
//! an audit log extract, the integrity statement, and `SEAL.json` — the
//! cryptographic binding that references every file by SHA-256. The seal is
//! itself hashed into `SEAL_HASH.txt`.
//!
//! Failure of a single algorithm is captured as a failure result inside the
//! archive; the seal is still produced. A storage failure while writing the
//! archive aborts the export with no partial archive left behind (the ZIP
//! is assembled in a temp sibling and renamed on success).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use ev_core::envelope::{AlgorithmParams, AlgorithmResult};
use ev_core::external::{AuditSink, CaseDb};
use ev_core::ids::{CaseId, TenantId};
use ev_core::time;
use ev_store::EvidenceStore;

use ev_algo::algorithms::EXPORT_SET;
use ev_algo::{run_and_record, AlgoContext, AlgorithmRegistry, PdfCodec};
use ev_report::digests;
use ev_report::statement::{IntegrityStatement, StatementInputs};

use crate::versions::{version_manifest, VersionManifest};
use crate::PipelineError;

pub const SEAL_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub export_root: PathBuf,
}

impl ExportConfig {
    pub fn new(export_root: impl Into<PathBuf>) -> Self {
        Self {
            export_root: export_root.into(),
        }
    }
}

/// Per-algorithm provenance block inside the seal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmSummary {
    pub version: String,
    pub run_id: String,
    pub success: bool,
    pub result_hash: String,
    pub params_hash: String,
    pub integrity_check: String,
    pub input_count: u64,
    pub output_count: u64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationInstructions {
    pub step_1: String,
    pub step_2: String,
    pub step_3: String,
    pub step_4: String,
    pub step_5: String,
}

impl Default for VerificationInstructions {
    fn default() -> Self {
        Self {
            step_1: "Compute SHA-256 of SEAL.json and compare with SEAL_HASH.txt.".into(),
            step_2: "For each entry in file_manifest, compute SHA-256 of the file.".into(),
            step_3: "Compare computed hashes with the recorded hashes.".into(),
            step_4: "If all hashes match, the package integrity is verified.".into(),
            step_5: "Review algorithm_summary for per-algorithm result hashes.".into(),
        }
    }
}

/// The cryptographic binding of the entire package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealDocument {
    pub seal_version: String,
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    pub generated_at: String,
    pub file_manifest: BTreeMap<String, String>,
    pub file_count: u64,
    pub manifest_hash: String,
    pub algorithm_summary: BTreeMap<String, AlgorithmSummary>,
    pub algorithm_versions: VersionManifest,
    pub verification_instructions: VerificationInstructions,
}

#[derive(Debug, Clone)]
pub struct SealedPackageOutcome {
    pub package_path: PathBuf,
    pub seal_hash: String,
    pub exhibit_count: u64,
    pub algorithms_run: Vec<String>,
    pub algorithm_versions: BTreeMap<String, String>,
    pub total_files: u64,
}

/// Build and seal a court export package for `(case_id, tenant_id)`.
#[allow(clippy::too_many_arguments)]
pub fn build_sealed_package(
    registry: &AlgorithmRegistry,
    store: &EvidenceStore,
    db: &dyn CaseDb,
    audit: Option<&dyn AuditSink>,
    pdf: Option<&dyn PdfCodec>,
    case_id: CaseId,
    tenant_id: TenantId,
    actor_id: Option<u64>,
    actor_name: &str,
    generated_at: DateTime<Utc>,
    config: &ExportConfig,
) -> Result<SealedPackageOutcome, PipelineError> {
    let params = AlgorithmParams::new(case_id, tenant_id).with_actor(actor_id, actor_name);
    let mut ctx = AlgoContext::new(store, db);
    if let Some(sink) = audit {
        ctx = ctx.with_audit(sink);
    }
    if let Some(codec) = pdf {
        ctx = ctx.with_pdf(codec);
    }

    // Phase 1: run the export algorithm set. Individual failures become
    // failure results inside the archive; they never abort the build.
    let mut results: BTreeMap<String, AlgorithmResult> = BTreeMap::new();
    for algo_id in EXPORT_SET {
        let Some(algorithm) = registry.get(algo_id, None) else {
            warn!(algorithm_id = algo_id, "algorithm not in registry, skipping");
            continue;
        };
        let result = run_and_record(algorithm.as_ref(), &params, &ctx)?;
        results.insert(algo_id.to_string(), result);
    }

    // Phase 2: assemble the archive in a temp sibling, rename on success.
    let sealed_dir = config.export_root.join("sealed");
    fs::create_dir_all(&sealed_dir)?;
    let timestamp = generated_at.format("%Y%m%d_%H%M%S");
    let package_name = format!("sealed_court_package_case_{case_id}_{timestamp}.zip");
    let final_path = sealed_dir.join(&package_name);
    let tmp_path = sealed_dir.join(format!("{package_name}.{}.tmp", std::process::id()));

    let build = write_archive(
        &tmp_path,
        registry,
        db,
        &results,
        case_id,
        tenant_id,
        generated_at,
    );
    let seal_hash = match build {
        Ok(seal_hash) => seal_hash,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    };
    fs::rename(&tmp_path, &final_path)?;

    let exhibit_count = results
        .get("bates_generator")
        .filter(|r| r.success)
        .and_then(|r| r.payload["generated_count"].as_u64())
        .unwrap_or(0);
    let algorithm_versions: BTreeMap<String, String> = results
        .iter()
        .map(|(id, r)| (id.clone(), r.algorithm_version.clone()))
        .collect();
    let total_files = archive_file_count(&final_path)?;

    info!(
        package = %final_path.display(),
        seal = %&seal_hash[..16],
        "sealed court package built"
    );

    if let Some(sink) = audit {
        let details = json!({
            "package": package_name,
            "seal_hash": seal_hash,
            "algorithms_run": results.keys().collect::<Vec<_>>(),
            "total_files": total_files,
        });
        if let Err(e) = sink.record(
            &case_id.to_string(),
            "export.sealed",
            actor_id,
            Some(actor_name),
            &details,
        ) {
            warn!(error = %e, "failed to emit export audit");
        }
    }

    Ok(SealedPackageOutcome {
        package_path: final_path,
        seal_hash,
        exhibit_count,
        algorithms_run: results.keys().cloned().collect(),
        algorithm_versions,
        total_files,
    })
}

fn write_archive(
    path: &Path,
    registry: &AlgorithmRegistry,
    db: &dyn CaseDb,
    results: &BTreeMap<String, AlgorithmResult>,
    case_id: CaseId,
    tenant_id: TenantId,
    generated_at: DateTime<Utc>,
) -> Result<String, PipelineError> {
    let file = File::create(path)?;
    let mut archive = ZipWriter::new(file);
    // Fixed entry timestamps keep archive bytes reproducible per input.
    let entry_time = zip::DateTime::from_date_and_time(
        generated_at.year() as u16,
        generated_at.month() as u8,
        generated_at.day() as u8,
        generated_at.hour() as u8,
        generated_at.minute() as u8,
        generated_at.second() as u8,
    )
    .map_err(|_| PipelineError::Archive("timestamp outside zip range".into()))?;
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(entry_time);

    let mut file_manifest: BTreeMap<String, String> = BTreeMap::new();
    let add_entry =
        |archive: &mut ZipWriter<File>,
         manifest: &mut BTreeMap<String, String>,
         entry_path: &str,
         bytes: &[u8]|
         -> Result<(), PipelineError> {
            archive.start_file(entry_path, options)?;
            archive.write_all(bytes)?;
            manifest.insert(entry_path.to_string(), ev_io::hasher::sha256_hex(bytes));
            Ok(())
        };

    // Algorithm reports (canonical JSON result envelopes).
    for (algo_id, result) in results {
        let bytes = ev_io::canonical_json::to_canonical_bytes(result)?;
        add_entry(
            &mut archive,
            &mut file_manifest,
            &format!("reports/{algo_id}_report.json"),
            &bytes,
        )?;
    }

    // Frozen algorithm version manifest.
    let versions = version_manifest(registry, &time::format_utc(generated_at));
    let version_bytes = ev_io::canonical_json::to_canonical_bytes(&versions)?;
    add_entry(
        &mut archive,
        &mut file_manifest,
        "ALGORITHM_VERSIONS.json",
        &version_bytes,
    )?;

    // Human-readable digests for the successful reporting algorithms.
    if let Some(result) = results.get("timeline_alignment").filter(|r| r.success) {
        add_entry(
            &mut archive,
            &mut file_manifest,
            "TIMELINE_NOTES.txt",
            digests::timeline_notes(result).as_bytes(),
        )?;
    }
    if let Some(result) = results.get("redaction_verify").filter(|r| r.success) {
        add_entry(
            &mut archive,
            &mut file_manifest,
            "REDACTION_VERIFICATION.txt",
            digests::redaction_statement(result).as_bytes(),
        )?;
    }
    if let Some(result) = results.get("integrity_sweep").filter(|r| r.success) {
        add_entry(
            &mut archive,
            &mut file_manifest,
            "INTEGRITY_SWEEP_SUMMARY.txt",
            digests::integrity_summary(result).as_bytes(),
        )?;
    }

    // Case-scoped custody extract.
    let custody = db.list_custody(case_id, None)?;
    let audit_extract: Vec<Value> = custody
        .iter()
        .map(|record| {
            json!({
                "evidence_id": record.evidence_id,
                "action": record.action,
                "actor_name": record.actor_name,
                "timestamp": record.timestamp,
                "details": record.details,
            })
        })
        .collect();
    let audit_bytes = ev_io::canonical_json::to_canonical_bytes(&audit_extract)?;
    add_entry(&mut archive, &mut file_manifest, "audit_log.json", &audit_bytes)?;

    // Integrity statement, bound to the manifest accumulated so far.
    let manifest_hash_so_far = ev_io::hasher::sha256_canonical(&file_manifest)?;
    let statement = IntegrityStatement::generate(&StatementInputs::new(
        "COURT_PACKAGE",
        format!("CASE-{case_id}"),
        manifest_hash_so_far,
        generated_at,
        format!("IS-{}-case-{case_id}", generated_at.format("%Y%m%d%H%M%S")),
    ));
    archive.start_file("INTEGRITY_STATEMENT.txt", options)?;
    archive.write_all(&statement.text_bytes)?;
    file_manifest.insert(
        "INTEGRITY_STATEMENT.txt".to_string(),
        statement.text_sha256.clone(),
    );

    // SEAL.json — the binding document.
    let algorithm_summary: BTreeMap<String, AlgorithmSummary> = results
        .iter()
        .map(|(id, r)| {
            (
                id.clone(),
                AlgorithmSummary {
                    version: r.algorithm_version.clone(),
                    run_id: r.run_id.clone(),
                    success: r.success,
                    result_hash: r.result_hash.clone(),
                    params_hash: r.params_hash.clone(),
                    integrity_check: r.integrity_check.clone(),
                    input_count: r.input_hashes.len() as u64,
                    output_count: r.output_hashes.len() as u64,
                    duration_seconds: r.duration_seconds,
                },
            )
        })
        .collect();

    let seal = SealDocument {
        seal_version: SEAL_VERSION.to_string(),
        case_id,
        tenant_id,
        generated_at: time::format_utc(generated_at),
        manifest_hash: ev_io::hasher::sha256_canonical(&file_manifest)?,
        file_count: file_manifest.len() as u64,
        file_manifest,
        algorithm_summary,
        algorithm_versions: versions,
        verification_instructions: VerificationInstructions::default(),
    };
    let seal_bytes = ev_io::canonical_json::to_canonical_bytes(&seal)?;
    let seal_hash = ev_io::hasher::sha256_hex(&seal_bytes);
    archive.start_file("SEAL.json", options)?;
    archive.write_all(&seal_bytes)?;

    // SEAL_HASH.txt — the outer fingerprint plus the verification recipe.
    let seal_hash_text = format!(
        "INTEGRITY SEAL\n\
         ===============\n\
         Case: {case_id}\n\
         Generated: {}\n\
         SEAL.json SHA-256: {seal_hash}\n\
         \n\
         To verify this package:\n\
         1. Compute SHA-256 of SEAL.json\n\
         2. Compare with the hash above\n\
         3. For each file listed in SEAL.json file_manifest,\n\
         \x20  compute SHA-256 and compare\n\
         4. If all hashes match, the package is intact.\n",
        time::format_utc(generated_at)
    );
    archive.start_file("SEAL_HASH.txt", options)?;
    archive.write_all(seal_hash_text.as_bytes())?;

    let file = archive.finish()?;
    file.sync_all()?;
    Ok(seal_hash)
}

/// Downstream verification report for a sealed package.
#[derive(Debug, Clone)]
pub struct SealVerification {
    pub seal_hash_ok: bool,
    pub files_ok: bool,
    pub mismatched_files: Vec<String>,
}

impl SealVerification {
    pub fn intact(&self) -> bool {
        self.seal_hash_ok && self.files_ok
    }
}

/// Independent verification: rehash `SEAL.json` against `SEAL_HASH.txt`,
/// then rehash every entry listed in the seal's file manifest.
pub fn verify_sealed_package(path: &Path) -> Result<SealVerification, PipelineError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let seal_bytes = read_entry(&mut archive, "SEAL.json")?;
    let computed_seal_hash = ev_io::hasher::sha256_hex(&seal_bytes);

    let seal_hash_text = String::from_utf8(read_entry(&mut archive, "SEAL_HASH.txt")?)
        .map_err(|e| PipelineError::Archive(e.to_string()))?;
    let recorded_seal_hash = seal_hash_text
        .lines()
        .find_map(|line| line.strip_prefix("SEAL.json SHA-256: "))
        .ok_or_else(|| PipelineError::Archive("SEAL_HASH.txt missing digest line".into()))?
        .trim()
        .to_string();
    let seal_hash_ok = computed_seal_hash == recorded_seal_hash;

    let seal: SealDocument = serde_json::from_slice(&seal_bytes)?;
    let mut mismatched_files = Vec::new();
    for (entry_path, expected_hash) in &seal.file_manifest {
        match read_entry(&mut archive, entry_path) {
            Ok(bytes) => {
                if &ev_io::hasher::sha256_hex(&bytes) != expected_hash {
                    mismatched_files.push(entry_path.clone());
                }
            }
            Err(_) => mismatched_files.push(entry_path.clone()),
        }
    }

    Ok(SealVerification {
        seal_hash_ok,
        files_ok: mismatched_files.is_empty(),
        mismatched_files,
    })
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, PipelineError> {
    let mut entry = archive.by_name(name)?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn archive_file_count(path: &Path) -> Result<u64, PipelineError> {
    let archive = ZipArchive::new(File::open(path)?)?;
    Ok(archive.len() as u64)
}
