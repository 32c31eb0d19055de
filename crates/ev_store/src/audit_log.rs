//! Append-only JSONL audit sink.
//!
//! One canonical-JSON line per event. Entries are appended and never
//! edited or removed by normal operation; a correction appends a
//! corrective entry. Best-effort by contract — callers log failures and
//! carry on.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ev_core::external::{AuditSink, ExternalError};
use ev_core::time;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogLine {
    pub timestamp: String,
    pub evidence_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub details: Value,
}

pub struct JsonAuditLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonAuditLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ExternalError> {
        let path: PathBuf = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        }
        Ok(Self {
            path,
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full log back (tests and export tooling).
    pub fn read_all(&self) -> Result<Vec<AuditLogLine>, ExternalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|e| ExternalError::Unavailable(e.to_string()))
            })
            .collect()
    }
}

impl AuditSink for JsonAuditLog {
    fn record(
        &self,
        evidence_id: &str,
        action: &str,
        actor_id: Option<u64>,
        actor_name: Option<&str>,
        details: &Value,
    ) -> Result<(), ExternalError> {
        let line = AuditLogLine {
            timestamp: time::now_utc_string(),
            evidence_id: evidence_id.to_string(),
            action: action.to_string(),
            actor_id,
            actor_name: actor_name.map(str::to_string),
            details: details.clone(),
        };
        let mut bytes = ev_io::canonical_json::to_canonical_bytes(&line)
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        bytes.push(b'\n');

        let _guard = self.append_lock.lock();
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        f.write_all(&bytes)
            .map_err(|e| ExternalError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_are_ordered_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonAuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        for i in 0..3 {
            log.record("ev-1", "algorithm.completed", Some(9), Some("runner"), &json!({"seq": i}))
                .unwrap();
        }
        let lines = log.read_all().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(lines[2].details["seq"], 2);
    }

    #[test]
    fn empty_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonAuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        assert!(log.read_all().unwrap().is_empty());
    }
}
