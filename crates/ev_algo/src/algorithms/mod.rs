//! The seven registered forensic algorithms.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::{AlgoError, AlgorithmOutput, AlgorithmRegistry};

pub mod anomaly;
pub mod bates;
pub mod dedup;
pub mod integrity;
pub mod provenance;
pub mod redaction;
pub mod timeline;

/// Algorithm ids executed by the sealed-export builder, in run order.
pub const EXPORT_SET: [&str; 6] = [
    "integrity_sweep",
    "provenance_graph",
    "timeline_alignment",
    "bates_generator",
    "redaction_verify",
    "access_anomaly",
];

/// Compile-time embedded module sources: `(algorithm_id, module_path,
/// source_text)`. Hashed into the export version manifest for code-level
/// traceability of exactly what ran.
pub fn module_sources() -> &'static [(&'static str, &'static str, &'static str)] {
    &[
        ("access_anomaly", "ev_algo::algorithms::anomaly", include_str!("anomaly.rs")),
        ("bates_generator", "ev_algo::algorithms::bates", include_str!("bates.rs")),
        ("bulk_dedup", "ev_algo::algorithms::dedup", include_str!("dedup.rs")),
        ("integrity_sweep", "ev_algo::algorithms::integrity", include_str!("integrity.rs")),
        ("provenance_graph", "ev_algo::algorithms::provenance", include_str!("provenance.rs")),
        ("redaction_verify", "ev_algo::algorithms::redaction", include_str!("redaction.rs")),
        ("timeline_alignment", "ev_algo::algorithms::timeline", include_str!("timeline.rs")),
    ]
}

/// Register every built-in algorithm into `registry`.
pub fn register_builtins(registry: &mut AlgorithmRegistry) -> Result<(), AlgoError> {
    registry.register(Arc::new(dedup::BulkDedup))?;
    registry.register(Arc::new(provenance::ProvenanceGraph))?;
    registry.register(Arc::new(timeline::TimelineAlignment))?;
    registry.register(Arc::new(integrity::IntegritySweep))?;
    registry.register(Arc::new(bates::BatesGenerator))?;
    registry.register(Arc::new(redaction::RedactionVerify))?;
    registry.register(Arc::new(anomaly::AccessAnomaly))?;
    Ok(())
}

/// Wrap a typed report into the standard payload shape: the report fields
/// plus its own canonical hash (under `hash_field`) and the input/output
/// hash lists.
pub(crate) fn report_output<T: Serialize>(
    report: &T,
    hash_field: &str,
    input_hashes: Vec<String>,
    mut extra_output_hashes: Vec<String>,
    warnings: Vec<String>,
) -> Result<AlgorithmOutput, AlgoError> {
    let report_hash = ev_io::hasher::sha256_canonical(report)?;
    let mut payload = serde_json::to_value(report)?;
    {
        let map = payload
            .as_object_mut()
            .ok_or_else(|| AlgoError::Validation("report must serialize to an object".into()))?;
        map.insert(hash_field.to_string(), json!(report_hash));
        extra_output_hashes.push(report_hash);
        map.insert(
            "output_hashes".to_string(),
            serde_json::to_value(&extra_output_hashes)?,
        );
        map.insert("input_hashes".to_string(), serde_json::to_value(&input_hashes)?);
    }
    Ok(AlgorithmOutput {
        payload,
        input_hashes,
        output_hashes: extra_output_hashes,
        warnings,
    })
}
