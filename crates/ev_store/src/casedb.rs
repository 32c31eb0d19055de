//! Single-node `CaseDb` over canonical-JSON files.
//!
//! The relational metadata service is a black box to the core; this is the
//! shipped implementation for single-node deployments, the CLI, and the
//! integration tests. Layout under `root`:
//!
//! - `cases.json`                 — all cases
//! - `evidence_<case_id>.json`    — evidence links for a case
//! - `custody_<case_id>.json`     — chain-of-custody records
//! - `runs_<case_id>.json`        — algorithm run records (append-only)
//!
//! All writes are canonical JSON through the atomic writer; a process-wide
//! mutex serializes read-modify-write cycles.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use ev_core::envelope::AlgorithmRunRecord;
use ev_core::external::{CaseDb, CaseSummary, CustodyRecord, EvidenceRef, ExternalError};
use ev_core::ids::{CaseId, TenantId};

pub struct JsonCaseDb {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonCaseDb {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ExternalError> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root).map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_vec<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, ExternalError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&path).map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| ExternalError::Unavailable(e.to_string()))
    }

    fn write_vec<T: Serialize>(&self, name: &str, items: &[T]) -> Result<(), ExternalError> {
        let bytes = ev_io::canonical_json::to_canonical_bytes(&items)
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;
        ev_io::atomic::write_bytes_atomic(&self.root.join(name), &bytes)
            .map_err(|e| ExternalError::Unavailable(e.to_string()))
    }

    // -- seeding API (used by embedders, the CLI, and tests) ---------------

    pub fn upsert_case(&self, case: &CaseSummary) -> Result<(), ExternalError> {
        let _guard = self.write_lock.lock();
        let mut cases: Vec<CaseSummary> = self.read_vec("cases.json")?;
        match cases.iter_mut().find(|c| c.case_id == case.case_id) {
            Some(existing) => *existing = case.clone(),
            None => cases.push(case.clone()),
        }
        cases.sort_by_key(|c| c.case_id.0);
        self.write_vec("cases.json", &cases)
    }

    pub fn link_evidence(
        &self,
        case_id: CaseId,
        item: &EvidenceRef,
    ) -> Result<(), ExternalError> {
        let _guard = self.write_lock.lock();
        let name = format!("evidence_{}.json", case_id.0);
        let mut items: Vec<EvidenceRef> = self.read_vec(&name)?;
        match items.iter_mut().find(|e| e.db_id == item.db_id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        items.sort_by_key(|e| e.db_id);
        self.write_vec(&name, &items)
    }

    pub fn append_custody(
        &self,
        case_id: CaseId,
        record: &CustodyRecord,
    ) -> Result<(), ExternalError> {
        let _guard = self.write_lock.lock();
        let name = format!("custody_{}.json", case_id.0);
        let mut records: Vec<CustodyRecord> = self.read_vec(&name)?;
        records.push(record.clone());
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.write_vec(&name, &records)
    }
}

impl CaseDb for JsonCaseDb {
    fn load_case(
        &self,
        case_id: CaseId,
        tenant_id: TenantId,
    ) -> Result<Option<CaseSummary>, ExternalError> {
        let cases: Vec<CaseSummary> = self.read_vec("cases.json")?;
        Ok(cases
            .into_iter()
            .find(|c| c.case_id == case_id && c.tenant_id == tenant_id))
    }

    fn list_linked_evidence(&self, case_id: CaseId) -> Result<Vec<EvidenceRef>, ExternalError> {
        let mut items: Vec<EvidenceRef> =
            self.read_vec(&format!("evidence_{}.json", case_id.0))?;
        items.sort_by_key(|e| e.db_id);
        Ok(items)
    }

    fn list_custody(
        &self,
        case_id: CaseId,
        since: Option<&str>,
    ) -> Result<Vec<CustodyRecord>, ExternalError> {
        let mut records: Vec<CustodyRecord> =
            self.read_vec(&format!("custody_{}.json", case_id.0))?;
        if let Some(since) = since {
            records.retain(|r| r.timestamp.as_str() >= since);
        }
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(records)
    }

    fn store_run_record(&self, record: &AlgorithmRunRecord) -> Result<(), ExternalError> {
        let _guard = self.write_lock.lock();
        let name = format!("runs_{}.json", record.case_id.0);
        let mut records: Vec<AlgorithmRunRecord> = self.read_vec(&name)?;
        records.push(record.clone());
        self.write_vec(&name, &records)
    }

    fn list_run_records(
        &self,
        case_id: CaseId,
        algorithm_filter: Option<&[String]>,
    ) -> Result<Vec<AlgorithmRunRecord>, ExternalError> {
        let mut records: Vec<AlgorithmRunRecord> =
            self.read_vec(&format!("runs_{}.json", case_id.0))?;
        if let Some(filter) = algorithm_filter {
            records.retain(|r| filter.contains(&r.algorithm_id));
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev_core::envelope::AlgorithmParams;

    fn db() -> (tempfile::TempDir, JsonCaseDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = JsonCaseDb::open(dir.path().join("db")).unwrap();
        (dir, db)
    }

    fn case(case_id: u64, tenant_id: u64) -> CaseSummary {
        CaseSummary {
            case_id: CaseId(case_id),
            tenant_id: TenantId(tenant_id),
            title: format!("Case {case_id}"),
        }
    }

    #[test]
    fn tenant_scoping_is_enforced() {
        let (_d, db) = db();
        db.upsert_case(&case(1, 10)).unwrap();
        assert!(db.load_case(CaseId(1), TenantId(10)).unwrap().is_some());
        assert!(db.load_case(CaseId(1), TenantId(99)).unwrap().is_none());
        assert!(db.load_case(CaseId(2), TenantId(10)).unwrap().is_none());
    }

    #[test]
    fn run_records_ordered_and_filterable() {
        let (_d, db) = db();
        let params = AlgorithmParams::new(CaseId(1), TenantId(10));
        for (i, algo) in ["bulk_dedup", "integrity_sweep", "bulk_dedup"].iter().enumerate() {
            let record = AlgorithmRunRecord {
                run_id: format!("run-{i}"),
                case_id: CaseId(1),
                tenant_id: TenantId(10),
                algorithm_id: algo.to_string(),
                algorithm_version: "1.0.0".into(),
                params: params.clone(),
                params_hash: "p".into(),
                result_hash: "r".into(),
                integrity_check: "i".into(),
                success: true,
                created_at: format!("2026-02-10T12:00:0{i}.000000Z"),
            };
            db.store_run_record(&record).unwrap();
        }
        let all = db.list_run_records(CaseId(1), None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        let filtered = db
            .list_run_records(CaseId(1), Some(&["bulk_dedup".to_string()]))
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn custody_since_filter() {
        let (_d, db) = db();
        for (i, ts) in ["2026-01-01T00:00:00.000000Z", "2026-02-01T00:00:00.000000Z"]
            .iter()
            .enumerate()
        {
            db.append_custody(
                CaseId(1),
                &CustodyRecord {
                    evidence_id: format!("e{i}"),
                    action: "download".into(),
                    actor_id: None,
                    actor_name: Some("analyst".into()),
                    timestamp: ts.to_string(),
                    ip_address: None,
                    hash_after: None,
                    details: None,
                },
            )
            .unwrap();
        }
        let all = db.list_custody(CaseId(1), None).unwrap();
        assert_eq!(all.len(), 2);
        let recent = db
            .list_custody(CaseId(1), Some("2026-01-15T00:00:00.000000Z"))
            .unwrap();
        assert_eq!(recent.len(), 1);
    }
}
