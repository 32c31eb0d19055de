//! Redaction verification (non-destructive).
//!
//! For every item flagged redacted, examines the redacted derivative:
//!   1. Text-layer check — extractable text remaining is a warning.
//!   2. Annotation check — unapplied `/Redact` annotations are a failure
//!      (they are removable, the redaction is not burned in).
//!   3. Byte-leakage check — printable-ASCII runs from the original found
//!      verbatim in the derivative are a warning.
//!   4. Hash-difference check — a derivative identical to its original is
//!      a failure (no redaction applied).
//!
//! Reads evidence, never modifies it. All findings carry method context.

use serde::Serialize;
use serde_json::{json, Value};

use ev_core::envelope::AlgorithmParams;
use ev_core::external::EvidenceRef;
use ev_core::ids::CaseId;

use crate::casework::{linked_items, require_case};
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

pub const REDACTION_PASS: &str = "pass";
pub const REDACTION_FAIL: &str = "fail";
pub const REDACTION_WARNING: &str = "warning";
pub const REDACTION_SKIPPED: &str = "skipped";

/// Minimum printable-ASCII run length sampled from the original.
const LEAKAGE_SAMPLE_LEN: usize = 50;
/// Cap on the number of sampled segments per item.
const LEAKAGE_SAMPLE_CAP: usize = 100;

const REDACTED_TYPES: [&str; 2] = ["redacted", "redacted_copy"];

#[derive(Debug, Serialize)]
struct LeakageCheck {
    segments_checked: u64,
    segments_found_in_redacted: u64,
    potential_leakage: bool,
}

#[derive(Debug, Serialize)]
struct HashComparison {
    original_hash: String,
    redacted_hash: String,
    differs: bool,
}

#[derive(Debug, Serialize)]
struct ItemChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    text_layer: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotations: Option<Value>,
    byte_leakage: LeakageCheck,
    hash_comparison: HashComparison,
}

#[derive(Debug, Serialize)]
struct ItemResult {
    evidence_id: u64,
    original_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redacted_hash: Option<String>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checks: Option<ItemChecks>,
}

#[derive(Debug, Default, Serialize)]
struct RedactionSummary {
    pass: u64,
    fail: u64,
    warning: u64,
    skipped: u64,
}

#[derive(Debug, Serialize)]
struct RedactionReport {
    case_id: CaseId,
    total_checked: u64,
    summary: RedactionSummary,
    items: Vec<ItemResult>,
}

/// Extract printable-ASCII runs of at least `min_len` bytes.
pub fn ascii_segments(bytes: &[u8], min_len: usize) -> Vec<Vec<u8>> {
    let mut segments = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    for &b in bytes {
        if (32..127).contains(&b) {
            current.push(b);
        } else {
            if current.len() >= min_len {
                segments.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= min_len {
        segments.push(current);
    }
    segments
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn check_byte_leakage(original: &[u8], redacted: &[u8]) -> LeakageCheck {
    let segments = ascii_segments(original, LEAKAGE_SAMPLE_LEN);
    let checked = segments.len().min(LEAKAGE_SAMPLE_CAP);
    let leaked = segments[..checked]
        .iter()
        .filter(|s| contains_subslice(redacted, s))
        .count();
    LeakageCheck {
        segments_checked: checked as u64,
        segments_found_in_redacted: leaked as u64,
        potential_leakage: leaked > 0,
    }
}

/// Resolve the redacted derivative for an item: first manifest entry with a
/// redacted type whose bytes are present in the store.
fn find_redacted_derivative(
    item: &EvidenceRef,
    ctx: &AlgoContext<'_>,
) -> Result<Option<(String, Vec<u8>)>, AlgoError> {
    let Some(original_hash) = &item.sha256 else {
        return Ok(None);
    };
    let Some(evidence_id) = &item.evidence_store_id else {
        return Ok(None);
    };
    let Some(manifest) = ctx.store.load_manifest(evidence_id)? else {
        return Ok(None);
    };
    for derivative in &manifest.derivatives {
        if !REDACTED_TYPES.contains(&derivative.derivative_type.as_str()) {
            continue;
        }
        if let Some(found) = ctx.store.read_derivative(
            original_hash,
            &derivative.derivative_type,
            &derivative.filename,
        )? {
            return Ok(Some((derivative.sha256.as_str().to_string(), found.data)));
        }
    }
    Ok(None)
}

pub struct RedactionVerify;

impl Algorithm for RedactionVerify {
    fn id(&self) -> &'static str {
        "redaction_verify"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Verify that redacted derivatives are properly burned in and non-reversible."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;
        let mut items = linked_items(params, ctx)?;

        // Optional narrowing to specific relational ids.
        if let Some(filter) = params.extra.get("evidence_ids").and_then(Value::as_array) {
            let wanted: Vec<u64> = filter.iter().filter_map(Value::as_u64).collect();
            items.retain(|i| wanted.contains(&i.db_id));
        }

        let mut results: Vec<ItemResult> = Vec::new();
        let mut input_hashes: Vec<String> = Vec::new();
        let mut summary = RedactionSummary::default();

        for item in items.iter().filter(|i| i.is_redacted) {
            let Some(original_hash) = &item.sha256 else { continue };
            input_hashes.push(original_hash.as_str().to_string());

            let original = match ctx.store.read_original(original_hash)? {
                Some(found) => found,
                None => {
                    summary.skipped += 1;
                    results.push(ItemResult {
                        evidence_id: item.db_id,
                        original_filename: item.original_filename.clone(),
                        original_hash: Some(original_hash.as_str().to_string()),
                        redacted_hash: None,
                        status: REDACTION_SKIPPED,
                        reason: Some("Original not found in evidence store.".to_string()),
                        issues: Vec::new(),
                        checks: None,
                    });
                    continue;
                }
            };

            let Some((recorded_hash, redacted_bytes)) = find_redacted_derivative(item, ctx)?
            else {
                summary.skipped += 1;
                results.push(ItemResult {
                    evidence_id: item.db_id,
                    original_filename: item.original_filename.clone(),
                    original_hash: Some(original_hash.as_str().to_string()),
                    redacted_hash: None,
                    status: REDACTION_SKIPPED,
                    reason: Some("No redacted derivative found in manifest.".to_string()),
                    issues: Vec::new(),
                    checks: None,
                });
                continue;
            };

            let mut status = REDACTION_PASS;
            let mut issues: Vec<String> = Vec::new();
            let mut text_layer = None;
            let mut annotations = None;

            let is_pdf = item
                .file_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("pdf"));
            if is_pdf {
                match ctx.pdf.and_then(|codec| codec.extract_text(&redacted_bytes)) {
                    Some(check) => {
                        if check.has_text_layer {
                            issues.push(
                                "Redacted PDF still contains an extractable text layer.".into(),
                            );
                            status = REDACTION_WARNING;
                        }
                        text_layer = Some(serde_json::to_value(&check)?);
                    }
                    None => {
                        text_layer =
                            Some(json!({ "note": "PDF codec unavailable; text layer check skipped." }));
                    }
                }
                match ctx
                    .pdf
                    .and_then(|codec| codec.inspect_annotations(&redacted_bytes))
                {
                    Some(check) => {
                        if check.redaction_annotations > 0 {
                            issues.push(
                                "PDF contains unapplied redaction annotations (not burned in)."
                                    .into(),
                            );
                            status = REDACTION_FAIL;
                        }
                        annotations = Some(serde_json::to_value(&check)?);
                    }
                    None => {
                        annotations =
                            Some(json!({ "note": "PDF codec unavailable; annotation check skipped." }));
                    }
                }
            }

            let leakage = check_byte_leakage(&original.data, &redacted_bytes);
            if leakage.potential_leakage {
                issues.push(format!(
                    "Found {} original text segments in redacted derivative (potential content leakage).",
                    leakage.segments_found_in_redacted
                ));
                if status != REDACTION_FAIL {
                    status = REDACTION_WARNING;
                }
            }

            let redacted_hash_computed = ev_io::hasher::sha256_hex(&redacted_bytes);
            let hash_comparison = HashComparison {
                original_hash: original.sha256.clone(),
                redacted_hash: redacted_hash_computed.clone(),
                differs: original.sha256 != redacted_hash_computed,
            };
            if !hash_comparison.differs {
                issues.push(
                    "Redacted derivative has identical hash to original — no redaction applied."
                        .into(),
                );
                status = REDACTION_FAIL;
            }

            match status {
                REDACTION_PASS => summary.pass += 1,
                REDACTION_FAIL => summary.fail += 1,
                _ => summary.warning += 1,
            }
            results.push(ItemResult {
                evidence_id: item.db_id,
                original_filename: item.original_filename.clone(),
                original_hash: Some(original_hash.as_str().to_string()),
                redacted_hash: Some(recorded_hash),
                status,
                reason: None,
                issues,
                checks: Some(ItemChecks {
                    text_layer,
                    annotations,
                    byte_leakage: leakage,
                    hash_comparison,
                }),
            });
        }

        let report = RedactionReport {
            case_id: params.case_id,
            total_checked: results.len() as u64,
            summary,
            items: results,
        };

        super::report_output(&report, "report_hash", input_hashes, Vec::new(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_segments_split_on_binary() {
        let text = b"A".repeat(60);
        let mut bytes = text.clone();
        bytes.push(0x00);
        bytes.extend(b"short");
        bytes.push(0x00);
        bytes.extend(b"B".repeat(50));
        let segments = ascii_segments(&bytes, 50);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], text);
    }

    #[test]
    fn leakage_detects_verbatim_runs() {
        let secret = b"CONFIDENTIAL WITNESS STATEMENT: the quick brown fox jumps".to_vec();
        let mut original = vec![0u8; 10];
        original.extend(&secret);
        original.push(0);

        let leaked = check_byte_leakage(&original, &secret);
        assert!(leaked.potential_leakage);

        let clean = check_byte_leakage(&original, b"[REDACTED]");
        assert!(!clean.potential_leakage);
        assert_eq!(clean.segments_checked, 1);
    }

    #[test]
    fn subslice_search_edges() {
        assert!(contains_subslice(b"abcdef", b"cde"));
        assert!(!contains_subslice(b"abc", b"abcd"));
        assert!(!contains_subslice(b"abc", b""));
    }
}
