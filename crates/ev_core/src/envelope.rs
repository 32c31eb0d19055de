//! Algorithm run envelopes: params, result, persisted run record.
//!
//! `AlgorithmResult` carries the full provenance block required for
//! independent verification: input/output/params/result hashes plus a
//! self-verifying `integrity_check` over everything but itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CaseId, TenantId};

/// Immutable, canonicalizable parameters for one algorithm run.
///
/// The base carries tenant/case context every algorithm requires; anything
/// algorithm-specific rides in `extra` (the one intentionally open-ended
/// mapping in the core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParams {
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl AlgorithmParams {
    pub fn new(case_id: CaseId, tenant_id: TenantId) -> Self {
        Self {
            case_id,
            tenant_id,
            actor_id: None,
            actor_name: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<u64>, actor_name: impl Into<String>) -> Self {
        self.actor_id = actor_id;
        self.actor_name = Some(actor_name.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Actor label used in audit entries when no name was supplied.
    pub fn actor_label(&self) -> &str {
        self.actor_name.as_deref().unwrap_or("system")
    }

    pub fn extra_bool(&self, key: &str, default: bool) -> bool {
        self.extra.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn extra_u64(&self, key: &str, default: u64) -> u64 {
        self.extra.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn extra_f64(&self, key: &str, default: f64) -> f64 {
        self.extra.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Standard result envelope for every algorithm run.
///
/// `integrity_check` = SHA-256 of the canonical form of all other fields;
/// `result_hash` = SHA-256 of the canonical payload. Framework timing
/// fields (`started_at`, `completed_at`, `duration_seconds`) are the only
/// wall-clock values and are excluded from `result_hash` by construction
/// (they live outside the payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmResult {
    // Identity
    pub algorithm_id: String,
    pub algorithm_version: String,
    pub run_id: String,

    // Provenance
    pub input_hashes: Vec<String>,
    pub output_hashes: Vec<String>,
    pub params_hash: String,
    pub result_hash: String,

    // Payload
    pub payload: Value,

    // Timing
    pub started_at: String,
    pub completed_at: String,
    pub duration_seconds: f64,

    // Status
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,

    // Integrity
    pub integrity_check: String,
}

/// Persisted form of an `AlgorithmResult`, scoped to a case, used by the
/// replay harness. Stores the full params so replay reconstructs the run
/// exactly; never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmRunRecord {
    pub run_id: String,
    pub case_id: CaseId,
    pub tenant_id: TenantId,
    pub algorithm_id: String,
    pub algorithm_version: String,
    pub params: AlgorithmParams,
    pub params_hash: String,
    pub result_hash: String,
    pub integrity_check: String,
    pub success: bool,
    pub created_at: String,
}

impl AlgorithmRunRecord {
    pub fn from_result(result: &AlgorithmResult, params: &AlgorithmParams) -> Self {
        Self {
            run_id: result.run_id.clone(),
            case_id: params.case_id,
            tenant_id: params.tenant_id,
            algorithm_id: result.algorithm_id.clone(),
            algorithm_version: result.algorithm_version.clone(),
            params: params.clone(),
            params_hash: result.params_hash.clone(),
            result_hash: result.result_hash.clone(),
            integrity_check: result.integrity_check.clone(),
            success: result.success,
            created_at: result.completed_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_accessors_fall_back_to_defaults() {
        let p = AlgorithmParams::new(CaseId(7), TenantId(1))
            .with_extra("near_dedup", json!(false))
            .with_extra("threshold", json!(0.9));
        assert!(!p.extra_bool("near_dedup", true));
        assert!(p.extra_bool("absent", true));
        assert_eq!(p.extra_u64("absent", 6), 6);
        assert!((p.extra_f64("threshold", 0.85) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn actor_label_defaults_to_system() {
        let p = AlgorithmParams::new(CaseId(1), TenantId(1));
        assert_eq!(p.actor_label(), "system");
        let p = p.with_actor(Some(3), "analyst");
        assert_eq!(p.actor_label(), "analyst");
    }
}
