//! Frozen algorithm version manifest.
//!
//! Pairs every registered algorithm with the SHA-256 of its embedded module
//! source, giving the export package code-level traceability of exactly
//! what ran. The source text is embedded at compile time, so the hash is
//! stable per build.

use serde::{Deserialize, Serialize};

use ev_algo::algorithms::module_sources;
use ev_algo::AlgorithmRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub algorithm_id: String,
    pub version: String,
    pub description: String,
    pub module: String,
    pub module_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub generated_at: String,
    pub algorithms: Vec<VersionEntry>,
}

/// Build the manifest for every algorithm in `registry`, sorted by
/// (id, version). Algorithms with no embedded source record
/// `module_hash = "unavailable"`.
pub fn version_manifest(registry: &AlgorithmRegistry, generated_at: &str) -> VersionManifest {
    let sources = module_sources();
    let algorithms = registry
        .list()
        .into_iter()
        .map(|info| {
            let source = sources.iter().find(|(id, _, _)| *id == info.algorithm_id);
            VersionEntry {
                algorithm_id: info.algorithm_id,
                version: info.version,
                description: info.description,
                module: source.map(|(_, module, _)| module.to_string()).unwrap_or_default(),
                module_hash: source
                    .map(|(_, _, text)| ev_io::hasher::sha256_hex(text.as_bytes()))
                    .unwrap_or_else(|| "unavailable".to_string()),
            }
        })
        .collect();
    VersionManifest {
        generated_at: generated_at.to_string(),
        algorithms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev_algo::registry::builtin_registry;

    #[test]
    fn builtin_manifest_covers_all_seven_with_hashes() {
        let registry = builtin_registry();
        let manifest = version_manifest(&registry, "2026-02-10T12:00:00.000000Z");
        assert_eq!(manifest.algorithms.len(), 7);
        for entry in &manifest.algorithms {
            assert!(ev_io::hasher::is_hex64(&entry.module_hash), "{}", entry.algorithm_id);
            assert!(entry.module.starts_with("ev_algo::algorithms::"));
        }
    }

    #[test]
    fn manifest_is_stable_for_fixed_inputs() {
        let registry = builtin_registry();
        let a = version_manifest(&registry, "t");
        let b = version_manifest(&registry, "t");
        assert_eq!(
            ev_io::hasher::sha256_canonical(&a).unwrap(),
            ev_io::hasher::sha256_canonical(&b).unwrap()
        );
    }
}
