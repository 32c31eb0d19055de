//! Bates + exhibit set generator.
//!
//! Produces Bates-numbered derivative copies. Originals are NEVER modified;
//! stamped copies are stored as `bates_stamped` derivatives carrying their
//! own SHA-256 and a reference to the original hash. Numbering is
//! deterministic given (case, prefix, start number, item order).
//!
//! PDF stamping goes through the `PdfCodec` seam; for every other type (and
//! when no codec is available) the derivative is the marker line
//! `"[BATES: <number>]\n"` followed by the original bytes.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::CaseId;

use crate::casework::{linked_items, require_case};
use crate::codec::StampPosition;
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

#[derive(Debug, Serialize)]
struct Exhibit {
    bates_number: String,
    evidence_id: u64,
    original_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    derivative_hash: Option<String>,
    original_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    derivative_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatesParameters {
    prefix: String,
    start_number: u64,
    number_width: u64,
    stamp_position: &'static str,
}

#[derive(Debug, Serialize)]
struct BatesReport {
    case_id: CaseId,
    prefix: String,
    start_number: u64,
    end_number: u64,
    total_exhibits: u64,
    generated_count: u64,
    skipped_count: u64,
    error_count: u64,
    exhibits: Vec<Exhibit>,
    parameters: BatesParameters,
}

/// Deterministic Bates number, e.g. `EVD-000001`.
pub fn bates_number(prefix: &str, number: u64, width: usize) -> String {
    format!("{prefix}-{number:0width$}")
}

pub struct BatesGenerator;

impl Algorithm for BatesGenerator {
    fn id(&self) -> &'static str {
        "bates_generator"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Generate Bates-stamped derivatives and exhibit bundles for court production."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;
        let items = linked_items(params, ctx)?;

        let prefix = params.extra_str("prefix").unwrap_or("EVD").to_string();
        let start_number = params.extra_u64("start_number", 1);
        let number_width = params.extra_u64("number_width", 6);
        let stamp_position =
            StampPosition::parse(params.extra_str("stamp_position").unwrap_or("bottom_right"));

        let mut exhibits: Vec<Exhibit> = Vec::new();
        let mut input_hashes: Vec<String> = Vec::new();
        let mut output_hashes: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut current = start_number;

        for item in &items {
            let Some(original_hash) = &item.sha256 else { continue };
            input_hashes.push(original_hash.as_str().to_string());
            let number = bates_number(&prefix, current, number_width as usize);

            let original = match ctx.store.read_original(original_hash) {
                Ok(Some(found)) => found,
                Ok(None) => {
                    exhibits.push(Exhibit {
                        bates_number: number,
                        evidence_id: item.db_id,
                        original_hash: original_hash.as_str().to_string(),
                        derivative_hash: None,
                        original_filename: item.original_filename.clone(),
                        derivative_filename: None,
                        size_bytes: None,
                        status: "skipped",
                        reason: Some("Original not found in evidence store.".to_string()),
                    });
                    current += 1;
                    continue;
                }
                Err(e) => {
                    exhibits.push(Exhibit {
                        bates_number: number,
                        evidence_id: item.db_id,
                        original_hash: original_hash.as_str().to_string(),
                        derivative_hash: None,
                        original_filename: item.original_filename.clone(),
                        derivative_filename: None,
                        size_bytes: None,
                        status: "error",
                        reason: Some(e.to_string()),
                    });
                    current += 1;
                    continue;
                }
            };

            // Stamp: codec overlay for PDFs, marker prefix otherwise.
            let is_pdf = item
                .file_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("pdf"));
            let stamped: Vec<u8> = if is_pdf {
                ctx.pdf
                    .and_then(|codec| codec.stamp_pages(&original.data, &number, stamp_position))
                    .unwrap_or_else(|| marker_derivative(&number, &original.data))
            } else {
                marker_derivative(&number, &original.data)
            };

            let derivative_hash = ev_io::hasher::sha256_hex(&stamped);
            output_hashes.push(derivative_hash.clone());
            let derivative_filename = format!("{number}_{}", item.original_filename);

            if !ctx.replay_mode {
                let mut parameters: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                parameters.insert("bates_number".into(), json!(number));
                parameters.insert("stamp_position".into(), json!(stamp_position.as_str()));
                parameters.insert("algorithm".into(), json!(self.id()));
                parameters.insert("algorithm_version".into(), json!(self.version()));
                if let Err(e) = ctx.store.store_derivative(
                    original_hash,
                    "bates_stamped",
                    &derivative_filename,
                    &stamped,
                    parameters,
                ) {
                    warn!(item = item.db_id, error = %e, "failed to store bates derivative");
                    warnings.push(format!(
                        "derivative not stored for item {}: {e}",
                        item.db_id
                    ));
                }
            }

            exhibits.push(Exhibit {
                bates_number: number,
                evidence_id: item.db_id,
                original_hash: original_hash.as_str().to_string(),
                derivative_hash: Some(derivative_hash),
                original_filename: item.original_filename.clone(),
                derivative_filename: Some(derivative_filename),
                size_bytes: Some(stamped.len() as u64),
                status: "generated",
                reason: None,
            });
            current += 1;
        }

        let count_status =
            |s: &str| exhibits.iter().filter(|e| e.status == s).count() as u64;
        let report = BatesReport {
            case_id: params.case_id,
            prefix: prefix.clone(),
            start_number,
            end_number: current.saturating_sub(1),
            total_exhibits: exhibits.len() as u64,
            generated_count: count_status("generated"),
            skipped_count: count_status("skipped"),
            error_count: count_status("error"),
            exhibits,
            parameters: BatesParameters {
                prefix,
                start_number,
                number_width,
                stamp_position: stamp_position.as_str(),
            },
        };

        super::report_output(&report, "manifest_hash", input_hashes, output_hashes, warnings)
    }
}

fn marker_derivative(number: &str, original: &[u8]) -> Vec<u8> {
    let mut out = format!("[BATES: {number}]\n").into_bytes();
    out.extend_from_slice(original);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bates_number_is_zero_padded() {
        assert_eq!(bates_number("EVD", 1, 6), "EVD-000001");
        assert_eq!(bates_number("ACME", 1234, 6), "ACME-001234");
        assert_eq!(bates_number("X", 7, 3), "X-007");
    }

    #[test]
    fn marker_derivative_prefixes_bytes() {
        let d = marker_derivative("EVD-000001", b"PDFDATA");
        assert_eq!(d, b"[BATES: EVD-000001]\nPDFDATA");
    }
}
