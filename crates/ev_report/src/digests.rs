//! Plain-text digest files for sealed export packages.
//!
//! Each digest is rendered from a finished `AlgorithmResult` payload and is
//! deterministic given the same result. The JSON reports remain the
//! machine-verifiable artifacts; these exist for human reviewers.

use serde_json::Value;

use ev_core::envelope::AlgorithmResult;

fn get_u64(v: &Value, path: &[&str]) -> u64 {
    let mut cur = v;
    for key in path {
        cur = &cur[*key];
    }
    cur.as_u64().unwrap_or(0)
}

/// Timestamp normalization notes for the timeline alignment result.
pub fn timeline_notes(result: &AlgorithmResult) -> String {
    let payload = &result.payload;
    let mut lines = vec![
        "TIMESTAMP NORMALIZATION NOTES".to_string(),
        "=".repeat(40),
        String::new(),
        format!("Total entries: {}", get_u64(payload, &["total_entries"])),
        format!(
            "Exact timestamps: {}",
            get_u64(payload, &["confidence_breakdown", "exact"])
        ),
        format!(
            "Derived timestamps: {}",
            get_u64(payload, &["confidence_breakdown", "derived"])
        ),
        format!(
            "Unknown timestamps: {}",
            get_u64(payload, &["confidence_breakdown", "unknown"])
        ),
        String::new(),
    ];

    if let Some(drifts) = payload["clock_drift_analysis"].as_array() {
        if !drifts.is_empty() {
            lines.push("Clock Drift Detected:".to_string());
            for pair in drifts {
                lines.push(format!(
                    "  {} <-> {}: {:.2}s median offset ({})",
                    pair["device_a"].as_str().unwrap_or("?"),
                    pair["device_b"].as_str().unwrap_or("?"),
                    pair["median_offset_seconds"].as_f64().unwrap_or(0.0),
                    pair["assessment"].as_str().unwrap_or("?"),
                ));
            }
            lines.push(String::new());
        }
    }

    if let Some(assumptions) = payload["assumptions"].as_array() {
        if !assumptions.is_empty() {
            lines.push("Assumptions:".to_string());
            for a in assumptions {
                lines.push(format!(
                    "  - item {}: {}",
                    a["evidence_id"].as_u64().unwrap_or(0),
                    a["assumption"].as_str().unwrap_or(""),
                ));
            }
            lines.push(String::new());
        }
    }

    lines.push(format!(
        "Algorithm: timeline_alignment v{}",
        result.algorithm_version
    ));
    lines.push(format!("Result hash: {}", result.result_hash));
    lines.join("\n")
}

/// Formal redaction verification statement.
pub fn redaction_statement(result: &AlgorithmResult) -> String {
    let payload = &result.payload;
    let lines = vec![
        "REDACTION VERIFICATION STATEMENT".to_string(),
        "=".repeat(40),
        String::new(),
        format!("Total items checked: {}", get_u64(payload, &["total_checked"])),
        format!("  Passed: {}", get_u64(payload, &["summary", "pass"])),
        format!("  Warnings: {}", get_u64(payload, &["summary", "warning"])),
        format!("  Failed: {}", get_u64(payload, &["summary", "fail"])),
        format!("  Skipped: {}", get_u64(payload, &["summary", "skipped"])),
        String::new(),
        "Methodology:".to_string(),
        "  1. Text-layer extraction to detect residual readable content.".to_string(),
        "  2. Annotation inspection to detect un-burned-in redaction marks.".to_string(),
        "  3. Byte-pattern scanning to detect original content leakage.".to_string(),
        "  4. Hash comparison to confirm derivative differs from original.".to_string(),
        String::new(),
        format!("Algorithm: redaction_verify v{}", result.algorithm_version),
        format!("Result hash: {}", result.result_hash),
        String::new(),
        "This verification report describes technical observations only.".to_string(),
        "It does not constitute a legal determination of redaction adequacy.".to_string(),
    ];
    lines.join("\n")
}

/// Concise integrity sweep summary.
pub fn integrity_summary(result: &AlgorithmResult) -> String {
    let payload = &result.payload;
    let all_passed = payload["all_passed"].as_bool().unwrap_or(false);
    let lines = vec![
        "INTEGRITY SWEEP SUMMARY".to_string(),
        "=".repeat(40),
        String::new(),
        format!(
            "Status: {}",
            if all_passed { "ALL PASSED" } else { "ISSUES DETECTED" }
        ),
        format!("Total items: {}", get_u64(payload, &["total_items"])),
        format!("  Passed: {}", get_u64(payload, &["summary", "pass"])),
        format!("  Failed: {}", get_u64(payload, &["summary", "fail"])),
        format!("  Missing: {}", get_u64(payload, &["summary", "missing"])),
        format!("  Errors: {}", get_u64(payload, &["summary", "error"])),
        String::new(),
        format!("Algorithm: integrity_sweep v{}", result.algorithm_version),
        format!(
            "Report hash: {}",
            payload["report_hash"].as_str().unwrap_or("N/A")
        ),
        format!("Result hash: {}", result.result_hash),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with(payload: Value) -> AlgorithmResult {
        AlgorithmResult {
            algorithm_id: "x".into(),
            algorithm_version: "1.0.0".into(),
            run_id: "r".into(),
            input_hashes: vec![],
            output_hashes: vec![],
            params_hash: "p".into(),
            result_hash: "abc123".into(),
            payload,
            started_at: String::new(),
            completed_at: String::new(),
            duration_seconds: 0.0,
            success: true,
            error: None,
            warnings: vec![],
            integrity_check: String::new(),
        }
    }

    #[test]
    fn integrity_summary_reflects_status() {
        let good = integrity_summary(&result_with(json!({
            "all_passed": true,
            "total_items": 2,
            "summary": {"pass": 2, "fail": 0, "missing": 0, "error": 0},
            "report_hash": "deadbeef",
        })));
        assert!(good.contains("Status: ALL PASSED"));
        assert!(good.contains("Report hash: deadbeef"));

        let bad = integrity_summary(&result_with(json!({
            "all_passed": false,
            "summary": {"fail": 1},
        })));
        assert!(bad.contains("Status: ISSUES DETECTED"));
    }

    #[test]
    fn timeline_notes_include_drift_and_assumptions() {
        let notes = timeline_notes(&result_with(json!({
            "total_entries": 3,
            "confidence_breakdown": {"exact": 2, "derived": 1, "unknown": 0},
            "clock_drift_analysis": [
                {"device_a": "cam_a", "device_b": "cam_b",
                 "median_offset_seconds": 3.2, "assessment": "minor"}
            ],
            "assumptions": [
                {"evidence_id": 7, "assumption": "Used record created_at as timestamp proxy."}
            ],
        })));
        assert!(notes.contains("cam_a <-> cam_b: 3.20s median offset (minor)"));
        assert!(notes.contains("item 7"));
        assert!(notes.contains("Result hash: abc123"));
    }

    #[test]
    fn redaction_statement_is_observation_only() {
        let text = redaction_statement(&result_with(json!({
            "total_checked": 1,
            "summary": {"pass": 1, "warning": 0, "fail": 0, "skipped": 0},
        })));
        assert!(text.contains("technical observations only"));
        assert!(text.contains("Total items checked: 1"));
    }
}
