//! Access anomaly detector (anti-tamper + misuse).
//!
//! Scans chain-of-custody records for a case inside a lookback window and
//! reports statistical observations — never accusations or conclusions:
//!   - download bursts: same (evidence, actor) repeatedly downloading
//!   - share-link bursts: one source address hammering share links
//!   - auth-failure bursts: repeated failed authentication from one source
//!   - off-hours access: activity outside the configured business band
//!
//! Deterministic: the window anchors at `reference_time` from params, or
//! the newest custody timestamp — never the wall clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::CaseId;
use ev_core::time;

use crate::casework::require_case;
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

pub const SEVERITY_INFO: &str = "info";
pub const SEVERITY_WARNING: &str = "warning";
pub const SEVERITY_ALERT: &str = "alert";

const DOWNLOAD_WINDOW_MINUTES: i64 = 10;
const SHARE_WINDOW_MINUTES: i64 = 60;
const AUTH_WINDOW_MINUTES: i64 = 15;
const OFF_HOURS_MIN_COUNT: u64 = 5;

#[derive(Debug, Clone)]
struct Entry {
    evidence_id: String,
    action: String,
    actor: String,
    ip: String,
    ts: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Anomaly {
    #[serde(rename = "type")]
    kind: &'static str,
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count_in_window: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    window_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    window_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    off_hours_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hours_range: Option<String>,
    description: String,
}

#[derive(Debug, Serialize)]
struct AnomalyParameters {
    lookback_days: u64,
    download_burst_threshold: u64,
    share_abuse_threshold: u64,
    auth_failure_threshold: u64,
    off_hours_start: u32,
    off_hours_end: u32,
}

#[derive(Debug, Serialize)]
struct AnomalyReport {
    case_id: CaseId,
    lookback_days: u64,
    reference_time: String,
    audit_entries_scanned: u64,
    total_anomalies: u64,
    anomalies: Vec<Anomaly>,
    summary_by_type: BTreeMap<String, u64>,
    summary_by_severity: BTreeMap<String, u64>,
    parameters: AnomalyParameters,
}

/// First rolling window (per group) reaching `threshold` yields one finding.
fn burst_scan(
    groups: &BTreeMap<String, Vec<DateTime<Utc>>>,
    window_minutes: i64,
    threshold: u64,
) -> Vec<(String, u64, DateTime<Utc>)> {
    let mut findings = Vec::new();
    for (key, timestamps) in groups {
        let mut sorted = timestamps.clone();
        sorted.sort();
        for (i, start) in sorted.iter().enumerate() {
            let window_end = *start + Duration::minutes(window_minutes);
            let count = sorted[i..].iter().take_while(|t| **t <= window_end).count() as u64;
            if count >= threshold {
                findings.push((key.clone(), count, *start));
                break; // one finding per group
            }
        }
    }
    findings
}

fn detect_download_bursts(entries: &[Entry], threshold: u64) -> Vec<Anomaly> {
    let mut groups: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    for e in entries {
        if e.action.to_lowercase().contains("download") {
            groups
                .entry(format!("{}:{}", e.evidence_id, e.actor))
                .or_default()
                .push(e.ts);
        }
    }
    burst_scan(&groups, DOWNLOAD_WINDOW_MINUTES, threshold)
        .into_iter()
        .map(|(key, count, start)| {
            let (evidence_id, actor) = key.split_once(':').unwrap_or((key.as_str(), "?"));
            Anomaly {
                kind: "download_burst",
                severity: SEVERITY_WARNING,
                evidence_id: Some(evidence_id.to_string()),
                actor: Some(actor.to_string()),
                ip_address: None,
                count_in_window: Some(count),
                window_start: Some(time::format_utc(start)),
                window_minutes: Some(DOWNLOAD_WINDOW_MINUTES),
                off_hours_count: None,
                hours_range: None,
                description: format!(
                    "Evidence {evidence_id} downloaded {count} times within {DOWNLOAD_WINDOW_MINUTES} minutes by {actor}."
                ),
            }
        })
        .collect()
}

fn detect_share_link_abuse(entries: &[Entry], threshold: u64) -> Vec<Anomaly> {
    let mut groups: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    for e in entries {
        let action = e.action.to_lowercase();
        if action.contains("share") || action.contains("accessed") {
            groups.entry(e.ip.clone()).or_default().push(e.ts);
        }
    }
    burst_scan(&groups, SHARE_WINDOW_MINUTES, threshold)
        .into_iter()
        .map(|(ip, count, start)| Anomaly {
            kind: "share_link_abuse",
            severity: SEVERITY_ALERT,
            evidence_id: None,
            actor: None,
            ip_address: Some(ip.clone()),
            count_in_window: Some(count),
            window_start: Some(time::format_utc(start)),
            window_minutes: Some(SHARE_WINDOW_MINUTES),
            off_hours_count: None,
            hours_range: None,
            description: format!(
                "Source {ip} accessed share links {count} times within {SHARE_WINDOW_MINUTES} minutes."
            ),
        })
        .collect()
}

fn detect_auth_failures(entries: &[Entry], threshold: u64) -> Vec<Anomaly> {
    let mut groups: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    for e in entries {
        let action = e.action.to_lowercase();
        if action.contains("fail") && (action.contains("auth") || action.contains("login")) {
            groups.entry(e.ip.clone()).or_default().push(e.ts);
        }
    }
    burst_scan(&groups, AUTH_WINDOW_MINUTES, threshold)
        .into_iter()
        .map(|(ip, count, start)| Anomaly {
            kind: "auth_failure_burst",
            severity: SEVERITY_ALERT,
            evidence_id: None,
            actor: None,
            ip_address: Some(ip.clone()),
            count_in_window: Some(count),
            window_start: Some(time::format_utc(start)),
            window_minutes: Some(AUTH_WINDOW_MINUTES),
            off_hours_count: None,
            hours_range: None,
            description: format!(
                "Source {ip} had {count} failed auth attempts within {AUTH_WINDOW_MINUTES} minutes."
            ),
        })
        .collect()
}

fn detect_off_hours_access(entries: &[Entry], start_hour: u32, end_hour: u32) -> Vec<Anomaly> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for e in entries {
        let hour = e.ts.hour();
        if hour >= start_hour || hour < end_hour {
            *counts.entry(e.actor.clone()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .filter(|(_, count)| *count >= OFF_HOURS_MIN_COUNT)
        .map(|(actor, count)| Anomaly {
            kind: "off_hours_access",
            severity: SEVERITY_INFO,
            evidence_id: None,
            actor: Some(actor.clone()),
            ip_address: None,
            count_in_window: None,
            window_start: None,
            window_minutes: None,
            off_hours_count: Some(count),
            hours_range: Some(format!("{start_hour}:00-{end_hour}:00 UTC")),
            description: format!(
                "User {actor} accessed evidence {count} times outside business hours ({start_hour}:00-{end_hour}:00 UTC)."
            ),
        })
        .collect()
}

pub struct AccessAnomaly;

impl Algorithm for AccessAnomaly {
    fn id(&self) -> &'static str {
        "access_anomaly"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Detect suspicious access patterns from the audit log."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;

        let lookback_days = params.extra_u64("lookback_days", 30);
        let download_threshold = params.extra_u64("download_burst_threshold", 5);
        let share_threshold = params.extra_u64("share_abuse_threshold", 20);
        let auth_threshold = params.extra_u64("auth_failure_threshold", 10);
        let off_hours_start = params.extra_u64("off_hours_start", 22) as u32;
        let off_hours_end = params.extra_u64("off_hours_end", 6) as u32;

        let custody = ctx.db.list_custody(params.case_id, None)?;
        let mut all: Vec<Entry> = custody
            .iter()
            .filter_map(|r| {
                Some(Entry {
                    evidence_id: r.evidence_id.clone(),
                    action: r.action.clone(),
                    actor: r.actor_name.clone().unwrap_or_else(|| "unknown".into()),
                    ip: r.ip_address.clone().unwrap_or_else(|| "unknown".into()),
                    ts: time::parse_flexible(&r.timestamp)?,
                })
            })
            .collect();
        all.sort_by_key(|e| e.ts);

        // Window anchor: explicit param, else newest custody entry.
        let reference = params
            .extra_str("reference_time")
            .and_then(time::parse_flexible)
            .or_else(|| all.last().map(|e| e.ts));
        let entries: Vec<Entry> = match reference {
            Some(reference) => {
                let cutoff = reference - Duration::days(lookback_days as i64);
                all.into_iter().filter(|e| e.ts >= cutoff).collect()
            }
            None => Vec::new(),
        };

        let mut anomalies = Vec::new();
        anomalies.extend(detect_download_bursts(&entries, download_threshold));
        anomalies.extend(detect_share_link_abuse(&entries, share_threshold));
        anomalies.extend(detect_auth_failures(&entries, auth_threshold));
        anomalies.extend(detect_off_hours_access(&entries, off_hours_start, off_hours_end));

        let severity_rank = |s: &str| match s {
            SEVERITY_ALERT => 0u8,
            SEVERITY_WARNING => 1,
            _ => 2,
        };
        anomalies.sort_by_key(|a| severity_rank(a.severity));

        let mut summary_by_type: BTreeMap<String, u64> = BTreeMap::new();
        let mut summary_by_severity: BTreeMap<String, u64> = BTreeMap::new();
        for a in &anomalies {
            *summary_by_type.entry(a.kind.to_string()).or_default() += 1;
            *summary_by_severity.entry(a.severity.to_string()).or_default() += 1;
        }

        let report = AnomalyReport {
            case_id: params.case_id,
            lookback_days,
            reference_time: reference.map(time::format_utc).unwrap_or_default(),
            audit_entries_scanned: entries.len() as u64,
            total_anomalies: anomalies.len() as u64,
            anomalies,
            summary_by_type,
            summary_by_severity,
            parameters: AnomalyParameters {
                lookback_days,
                download_burst_threshold: download_threshold,
                share_abuse_threshold: share_threshold,
                auth_failure_threshold: auth_threshold,
                off_hours_start,
                off_hours_end,
            },
        };

        super::report_output(&report, "report_hash", Vec::new(), Vec::new(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(action: &str, actor: &str, ip: &str, minute: u32) -> Entry {
        Entry {
            evidence_id: "ev-1".into(),
            action: action.into(),
            actor: actor.into(),
            ip: ip.into(),
            ts: Utc.with_ymd_and_hms(2026, 2, 10, 14, minute, 0).unwrap(),
        }
    }

    #[test]
    fn download_burst_fires_once_per_group() {
        let entries: Vec<Entry> = (0..6).map(|m| entry("file_download", "a", "ip", m)).collect();
        let found = detect_download_bursts(&entries, 5);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, "download_burst");
        assert_eq!(found[0].count_in_window, Some(6));
    }

    #[test]
    fn below_threshold_is_silent() {
        let entries: Vec<Entry> = (0..3).map(|m| entry("download", "a", "ip", m)).collect();
        assert!(detect_download_bursts(&entries, 5).is_empty());
    }

    #[test]
    fn spread_out_downloads_do_not_burst() {
        // 5 downloads 15 minutes apart never fit a 10-minute window.
        let entries: Vec<Entry> = (0..5u32)
            .map(|i| Entry {
                ts: Utc.with_ymd_and_hms(2026, 2, 10, 10 + i, 0, 0).unwrap(),
                ..entry("download", "a", "ip", 0)
            })
            .collect();
        assert!(detect_download_bursts(&entries, 5).is_empty());
    }

    #[test]
    fn auth_failures_need_auth_and_fail() {
        let mut entries: Vec<Entry> =
            (0..10).map(|m| entry("auth_failed_login", "x", "1.2.3.4", m)).collect();
        entries.push(entry("download_failed", "x", "1.2.3.4", 11));
        let found = detect_auth_failures(&entries, 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, SEVERITY_ALERT);
    }

    #[test]
    fn off_hours_counts_across_midnight_band() {
        let make = |hour: u32, i: u32| Entry {
            ts: Utc.with_ymd_and_hms(2026, 2, 10, hour, i, 0).unwrap(),
            ..entry("viewed", "night_owl", "ip", 0)
        };
        let entries: Vec<Entry> = (0..3)
            .map(|i| make(23, i))
            .chain((0..3).map(|i| make(2, i)))
            .collect();
        let found = detect_off_hours_access(&entries, 22, 6);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].off_hours_count, Some(6));
        assert_eq!(found[0].severity, SEVERITY_INFO);
    }

    #[test]
    fn daytime_access_is_not_flagged() {
        let entries: Vec<Entry> = (0..10).map(|m| entry("viewed", "a", "ip", m)).collect();
        assert!(detect_off_hours_access(&entries, 22, 6).is_empty());
    }
}
