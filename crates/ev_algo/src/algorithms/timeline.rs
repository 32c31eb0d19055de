//! Cross-device timeline alignment.
//!
//! Normalizes timestamps across evidence from multiple devices, detects
//! clock drift, and builds a unified timeline. No guesswork: a missing
//! timestamp is `unknown`, a record-creation fallback is `derived` with the
//! assumption recorded explicitly. Fully deterministic given the same
//! evidence metadata — every timestamp comes from input data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::CaseId;
use ev_core::time;

use crate::casework::{linked_items, require_case};
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

pub const CONFIDENCE_EXACT: &str = "exact";
pub const CONFIDENCE_DERIVED: &str = "derived";
pub const CONFIDENCE_UNKNOWN: &str = "unknown";

/// Event pairs within this window count toward drift estimation.
const DRIFT_WINDOW_SECONDS: f64 = 300.0;

#[derive(Debug, Clone, Serialize)]
struct TimelineEntry {
    evidence_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_sha256: Option<String>,
    original_filename: String,
    device_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_iso: Option<String>,
    timestamp_confidence: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Assumption {
    evidence_id: u64,
    assumption: String,
    original_filename: String,
}

#[derive(Debug, Serialize)]
struct ClockDrift {
    device_a: String,
    device_b: String,
    sample_count: u64,
    median_offset_seconds: f64,
    min_offset_seconds: f64,
    max_offset_seconds: f64,
    assessment: &'static str,
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    event_count: u64,
    earliest: String,
    latest: String,
}

#[derive(Debug, Serialize)]
struct ConfidenceBreakdown {
    exact: u64,
    derived: u64,
    unknown: u64,
}

#[derive(Debug, Serialize)]
struct TimelineReport {
    case_id: CaseId,
    total_entries: u64,
    confidence_breakdown: ConfidenceBreakdown,
    timeline_entries: Vec<TimelineEntry>,
    clock_drift_analysis: Vec<ClockDrift>,
    device_summary: BTreeMap<String, DeviceSummary>,
    assumptions: Vec<Assumption>,
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn assess(median: f64) -> &'static str {
    let abs = median.abs();
    if abs < 2.0 {
        "negligible"
    } else if abs < 30.0 {
        "minor"
    } else {
        "significant"
    }
}

/// For each pair of devices, the drift is the median of (ts_A − ts_B) over
/// all event pairs within the 5-minute window, plus min/max.
fn detect_clock_drift(device_groups: &BTreeMap<String, Vec<DateTime<Utc>>>) -> Vec<ClockDrift> {
    let devices: Vec<&String> = device_groups.keys().collect();
    let mut drifts = Vec::new();

    for i in 0..devices.len() {
        for j in (i + 1)..devices.len() {
            let events_a = &device_groups[devices[i]];
            let events_b = &device_groups[devices[j]];

            let mut offsets: Vec<f64> = Vec::new();
            for ts_a in events_a {
                for ts_b in events_b {
                    let offset = (*ts_a - *ts_b).num_milliseconds() as f64 / 1000.0;
                    if offset.abs() <= DRIFT_WINDOW_SECONDS {
                        offsets.push(offset);
                    }
                }
            }
            if offsets.is_empty() {
                continue;
            }
            offsets.sort_by(f64::total_cmp);
            let median = offsets[offsets.len() / 2];
            drifts.push(ClockDrift {
                device_a: devices[i].clone(),
                device_b: devices[j].clone(),
                sample_count: offsets.len() as u64,
                median_offset_seconds: round3(median),
                min_offset_seconds: round3(offsets[0]),
                max_offset_seconds: round3(offsets[offsets.len() - 1]),
                assessment: assess(median),
            });
        }
    }
    drifts
}

pub struct TimelineAlignment;

impl Algorithm for TimelineAlignment {
    fn id(&self) -> &'static str {
        "timeline_alignment"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Normalize cross-device timestamps and detect clock drift."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;
        let items = linked_items(params, ctx)?;

        let mut entries: Vec<TimelineEntry> = Vec::new();
        let mut device_groups: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
        let mut assumptions: Vec<Assumption> = Vec::new();
        let mut input_hashes: Vec<String> = Vec::new();

        for item in &items {
            if let Some(h) = &item.sha256 {
                input_hashes.push(h.as_str().to_string());
            }

            let (ts, confidence) = match item.collected_date.as_deref().and_then(time::parse_flexible) {
                Some(ts) => (Some(ts), CONFIDENCE_EXACT),
                None => match item.created_at.as_deref().and_then(time::parse_flexible) {
                    Some(ts) => {
                        assumptions.push(Assumption {
                            evidence_id: item.db_id,
                            assumption: "Used record created_at as timestamp proxy; original collection date unavailable.".to_string(),
                            original_filename: item.original_filename.clone(),
                        });
                        (Some(ts), CONFIDENCE_DERIVED)
                    }
                    None => (None, CONFIDENCE_UNKNOWN),
                },
            };

            let device_label = item
                .device_label
                .clone()
                .unwrap_or_else(|| "unknown_device".to_string());

            entries.push(TimelineEntry {
                evidence_id: item.db_id,
                hash_sha256: item.sha256.as_ref().map(|h| h.as_str().to_string()),
                original_filename: item.original_filename.clone(),
                device_label: device_label.clone(),
                device_type: item.device_type.clone(),
                timestamp_iso: ts.map(time::format_utc),
                timestamp_confidence: confidence,
                file_type: item.file_type.clone(),
                duration_seconds: item.duration_seconds,
            });

            if let Some(ts) = ts {
                device_groups.entry(device_label).or_default().push(ts);
            }
        }

        // Exact first, then derived, then unknown; within a confidence band
        // by timestamp.
        let rank = |c: &str| match c {
            CONFIDENCE_EXACT => 0u8,
            CONFIDENCE_DERIVED => 1,
            _ => 2,
        };
        entries.sort_by(|a, b| {
            (
                rank(a.timestamp_confidence),
                a.timestamp_iso.as_deref().unwrap_or("9999"),
            )
                .cmp(&(
                    rank(b.timestamp_confidence),
                    b.timestamp_iso.as_deref().unwrap_or("9999"),
                ))
        });

        let clock_drifts = detect_clock_drift(&device_groups);

        let mut device_summary = BTreeMap::new();
        for (device, timestamps) in &device_groups {
            let earliest = timestamps.iter().min().expect("non-empty group");
            let latest = timestamps.iter().max().expect("non-empty group");
            device_summary.insert(
                device.clone(),
                DeviceSummary {
                    event_count: timestamps.len() as u64,
                    earliest: time::format_utc(*earliest),
                    latest: time::format_utc(*latest),
                },
            );
        }

        let count_by = |c: &str| entries.iter().filter(|e| e.timestamp_confidence == c).count() as u64;
        let report = TimelineReport {
            case_id: params.case_id,
            total_entries: entries.len() as u64,
            confidence_breakdown: ConfidenceBreakdown {
                exact: count_by(CONFIDENCE_EXACT),
                derived: count_by(CONFIDENCE_DERIVED),
                unknown: count_by(CONFIDENCE_UNKNOWN),
            },
            timeline_entries: entries,
            clock_drift_analysis: clock_drifts,
            device_summary,
            assumptions,
        };

        super::report_output(&report, "timeline_hash", input_hashes, Vec::new(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, sec).unwrap()
    }

    #[test]
    fn drift_median_and_assessment() {
        let mut groups = BTreeMap::new();
        // Device A consistently 3.2 s ahead of device B.
        groups.insert("cam_a".to_string(), vec![ts(10), ts(20), ts(30)]);
        let offset = chrono::Duration::milliseconds(3200);
        groups.insert(
            "cam_b".to_string(),
            vec![ts(10) - offset, ts(20) - offset, ts(30) - offset],
        );
        let drifts = detect_clock_drift(&groups);
        assert_eq!(drifts.len(), 1);
        let d = &drifts[0];
        assert_eq!(d.device_a, "cam_a");
        assert_eq!(d.device_b, "cam_b");
        assert!((d.median_offset_seconds - 3.2).abs() < 1e-9);
        assert_eq!(d.assessment, "minor");
    }

    #[test]
    fn far_apart_events_do_not_pair() {
        let mut groups = BTreeMap::new();
        groups.insert("a".to_string(), vec![ts(0)]);
        groups.insert(
            "b".to_string(),
            vec![Utc.with_ymd_and_hms(2026, 2, 10, 13, 0, 0).unwrap()],
        );
        assert!(detect_clock_drift(&groups).is_empty());
    }

    #[test]
    fn assessment_bands() {
        assert_eq!(assess(0.5), "negligible");
        assert_eq!(assess(-1.9), "negligible");
        assert_eq!(assess(3.2), "minor");
        assert_eq!(assess(-29.0), "minor");
        assert_eq!(assess(31.0), "significant");
    }
}
