//! Evidence Integrity Statement — deterministic generator.
//!
//! The template text below is fixed and neutral: no jurisdiction-specific
//! conclusions, no variation between runs. Bracketed fields are populated at
//! build time from explicit inputs so identical inputs always produce
//! identical UTF-8 bytes.
//!
//! Two-pass generation:
//!   1. Render the template with every field substituted except the
//!      self-hash position, which holds a placeholder token.
//!   2. Compute SHA-256 of the pass-1 bytes and replace the placeholder.
//!
//! Verification: substitute the embedded hash back with the placeholder and
//! rehash; the digests must agree.

use chrono::{DateTime, Utc};

/// Placeholder occupying the self-hash position during pass 1.
pub const SELF_HASH_PLACEHOLDER: &str = "[COMPUTED_AFTER_RENDER]";

const TEMPLATE: &str = "\
EV-CORE — EVIDENCE INTEGRITY STATEMENT

Document ID: {statement_id}
Generated: {generated_timestamp}
System/Build: {app_name} {version} ({build_commit})
Export Scope: {scope}
Scope Identifier: {scope_id}


1. Purpose

This document describes how the evidence core ingests, stores, processes, \
and exports digital evidence while preserving integrity and producing \
verifiable outputs. It is a technical integrity statement and does not \
provide legal advice or legal conclusions.


2. What The System Does (Technical Functions)

The evidence core provides:

  - Ingestion of files (e.g., PDF, image, audio, video) into an evidence store.
  - Cryptographic hashing (SHA-256) to identify and verify file integrity.
  - Immutable storage of original files (\"originals\").
  - Generation of derivative files (e.g., stamped working copies) that are \
explicitly linked to their originals.
  - Append-only audit logging of key evidence-handling events.
  - Export packaging (ZIP) containing reports, manifests, and audit records \
to support independent verification.


3. What The System Does Not Do (Limitations)

The evidence core does not:

  - Alter, enhance, filter, or otherwise modify original evidence files.
  - Determine authenticity, intent, fault, liability, or credibility of \
persons or events.
  - Provide legal conclusions or jurisdiction-specific legal determinations.
  - Create or infer facts not present in the stored evidence and recorded \
metadata.


4. Evidence Identity and Hashing

4.1 Hash Algorithm
A SHA-256 hash is computed for each ingested file. The SHA-256 hash is \
recorded and used as an integrity identifier for the bytes of that file.

4.2 Duplicate Detection
If a file is ingested whose SHA-256 hash matches an existing stored item, \
the system treats it as the same underlying bytes. The existing evidence \
item may be linked to additional cases without duplicating the original \
bytes.

4.3 Hash Verification
A party can independently compute SHA-256 hashes on exported files and \
compare them to the hashes recorded in the export manifest(s).


5. Immutability of Originals

5.1 Immutable Originals
Original evidence files are stored as immutable objects. The system does \
not overwrite original bytes. If a different file is later uploaded, it \
results in a different SHA-256 hash and a distinct evidence identity.

5.2 Provenance via Audit and Links
Case membership is stored as relationships. Linking evidence to a case \
does not modify original evidence content.


6. Derivatives and Referential Integrity

6.1 Derivative Definition
Derivatives include outputs such as stamped working copies, redacted \
review copies, and manifests and reports generated for export.

6.2 Derivative Hashing
Each derivative is hashed (SHA-256) and recorded. Each derivative \
references its originating evidence item to preserve traceability.

6.3 No Derivative Substitution of Originals
Derivatives are provided for review and organization only. The original \
evidence remains the authoritative stored file.


7. Audit Logging (Append-Only)

7.1 Audit Model
Evidence-handling events are recorded in an append-only audit stream. \
Typical events include:
  - ingested
  - derivative_created
  - integrity_verified / integrity_failed
  - algorithm.completed / algorithm.failed
  - replay.completed
  - export.sealed

7.2 Immutability of Audit Records
Audit entries are appended and are not silently edited or removed by \
normal application operations. If a correction mechanism exists, it must \
append corrective entries rather than overwrite prior entries.


8. Export Packaging and Reproducibility

8.1 Export Contents
Exports include algorithm reports, a file manifest binding every entry by \
SHA-256, an audit log extract applicable to the exported scope, and this \
integrity statement.

8.2 Reproducibility Principle
An export is considered reproducible if the exported hashes match the \
manifest hashes, and re-exporting the same scope from the same stored \
originals and recorded transformations yields matching content hashes for \
included artifacts.


9. Independent Verification Procedure

To verify an export:

  1. Extract the ZIP export to a local folder.
  2. Locate the manifest file: {manifest_filename}.
  3. Compute SHA-256 hashes of exported files using an independent tool.
  4. Compare computed hashes to the hashes recorded in the manifest.
  5. Review audit_log.json to confirm the sequence of ingest, derivative \
creation, and export generation.

If any hash does not match, the export integrity is not verified.


10. Attestation

This document is generated by the evidence core as part of the export \
process. It describes system behavior and provides verification \
instructions. It does not attest to external authenticity beyond the \
cryptographic and audit properties described herein.

Generated by: {system_component}
Hash of this statement: {self_sha256}
Manifest Hash: {manifest_sha256}
";

/// Explicit inputs — no ambient reads, so output bytes are reproducible.
#[derive(Debug, Clone)]
pub struct StatementInputs {
    pub scope: String,
    pub scope_id: String,
    pub manifest_sha256: String,
    pub manifest_filename: String,
    pub generated_at: DateTime<Utc>,
    pub statement_id: String,
    pub app_name: String,
    pub version: String,
    pub build_commit: String,
    pub system_component: String,
}

impl StatementInputs {
    pub fn new(
        scope: impl Into<String>,
        scope_id: impl Into<String>,
        manifest_sha256: impl Into<String>,
        generated_at: DateTime<Utc>,
        statement_id: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            scope_id: scope_id.into(),
            manifest_sha256: manifest_sha256.into(),
            manifest_filename: "SEAL.json".to_string(),
            generated_at,
            statement_id: statement_id.into(),
            app_name: "ev-core".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_commit: "unknown".to_string(),
            system_component: "IntegrityStatementGenerator".to_string(),
        }
    }
}

/// The generated statement. `text_bytes` is the authoritative artifact.
#[derive(Debug, Clone)]
pub struct IntegrityStatement {
    pub text_bytes: Vec<u8>,
    pub text_sha256: String,
    pub self_sha256: String,
    pub statement_id: String,
}

impl IntegrityStatement {
    /// Generate the statement. Byte-identical across runs for identical
    /// inputs.
    pub fn generate(inputs: &StatementInputs) -> Self {
        let pass1 = render(inputs, SELF_HASH_PLACEHOLDER);
        let self_sha256 = ev_io::hasher::sha256_hex(pass1.as_bytes());
        let text = pass1.replace(SELF_HASH_PLACEHOLDER, &self_sha256);
        let text_bytes = text.into_bytes();
        let text_sha256 = ev_io::hasher::sha256_hex(&text_bytes);
        Self {
            text_bytes,
            text_sha256,
            self_sha256,
            statement_id: inputs.statement_id.clone(),
        }
    }

    /// Verify an embedded self-hash: substitute it back with the
    /// placeholder and rehash.
    pub fn verify_text(text: &str) -> bool {
        let Some(embedded) = extract_self_hash(text) else {
            return false;
        };
        let restored = text.replace(&embedded, SELF_HASH_PLACEHOLDER);
        ev_io::hasher::sha256_hex(restored.as_bytes()) == embedded
    }
}

fn render(inputs: &StatementInputs, self_hash: &str) -> String {
    TEMPLATE
        .replace("{statement_id}", &inputs.statement_id)
        .replace(
            "{generated_timestamp}",
            &inputs.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        )
        .replace("{app_name}", &inputs.app_name)
        .replace("{version}", &inputs.version)
        .replace("{build_commit}", &inputs.build_commit)
        .replace("{scope}", &inputs.scope)
        .replace("{scope_id}", &inputs.scope_id)
        .replace("{manifest_filename}", &inputs.manifest_filename)
        .replace("{manifest_sha256}", &inputs.manifest_sha256)
        .replace("{system_component}", &inputs.system_component)
        .replace("{self_sha256}", self_hash)
}

fn extract_self_hash(text: &str) -> Option<String> {
    let marker = "Hash of this statement: ";
    let start = text.find(marker)? + marker.len();
    let hash = text.get(start..start + 64)?;
    ev_io::hasher::is_hex64(hash).then(|| hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn inputs() -> StatementInputs {
        StatementInputs::new(
            "CASE",
            "CASE-X",
            "0".repeat(64),
            Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap(),
            "IS-20260210-fixed",
        )
    }

    #[test]
    fn byte_identical_on_repeat() {
        let a = IntegrityStatement::generate(&inputs());
        let b = IntegrityStatement::generate(&inputs());
        assert_eq!(a.text_bytes, b.text_bytes);
        assert_eq!(a.text_sha256, b.text_sha256);
    }

    #[test]
    fn self_hash_round_trips() {
        let statement = IntegrityStatement::generate(&inputs());
        let text = String::from_utf8(statement.text_bytes.clone()).unwrap();
        assert!(text.contains(&statement.self_sha256));
        assert!(!text.contains(SELF_HASH_PLACEHOLDER));
        assert!(IntegrityStatement::verify_text(&text));
    }

    #[test]
    fn tampered_text_fails_verification() {
        let statement = IntegrityStatement::generate(&inputs());
        let text = String::from_utf8(statement.text_bytes).unwrap();
        let tampered = text.replace("Immutable", "Mutable");
        assert!(!IntegrityStatement::verify_text(&tampered));
    }

    #[test]
    fn inputs_are_substituted() {
        let statement = IntegrityStatement::generate(&inputs());
        let text = String::from_utf8(statement.text_bytes).unwrap();
        assert!(text.contains("Export Scope: CASE\n"));
        assert!(text.contains("Scope Identifier: CASE-X\n"));
        assert!(text.contains("Generated: 2026-02-10 12:00:00 UTC"));
        assert!(text.contains(&"0".repeat(64)));
        assert!(!text.contains('{'), "no unsubstituted fields remain");
    }

    #[test]
    fn legal_advice_appears_only_negated() {
        let statement = IntegrityStatement::generate(&inputs());
        let text = String::from_utf8(statement.text_bytes).unwrap();
        let lower = text.to_lowercase();
        let mut from = 0;
        let mut occurrences = 0;
        while let Some(pos) = lower[from..].find("legal advice") {
            let abs = from + pos;
            let preceding = &lower[abs.saturating_sub(30)..abs];
            assert!(
                preceding.contains("not ") || preceding.contains("no "),
                "'legal advice' must be negated: …{preceding}"
            );
            occurrences += 1;
            from = abs + "legal advice".len();
        }
        assert!(occurrences >= 1);
    }
}
