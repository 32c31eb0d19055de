//! Versioned algorithm registry.
//!
//! Maps `algorithm_id → (version → Algorithm)`. Built explicitly at startup
//! and frozen before serving; after `freeze` the value is read-only and may
//! be shared without synchronization. Not an import-side-effect table.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{Algorithm, AlgoError};

/// Strict `(major, minor, patch)` parse used to order versions.
fn parse_semver(v: &str) -> Result<(u64, u64, u64), AlgoError> {
    let mut parts = v.split('.');
    let mut next = |name: &str| {
        parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(|| AlgoError::Validation(format!("bad semver {name} in {v:?}")))
    };
    let triple = (next("major")?, next("minor")?, next("patch")?);
    if parts.next().is_some() {
        return Err(AlgoError::Validation(format!("bad semver (extra parts) in {v:?}")));
    }
    Ok(triple)
}

/// Metadata row returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmInfo {
    pub algorithm_id: String,
    pub version: String,
    pub description: String,
}

#[derive(Default)]
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<String, BTreeMap<(u64, u64, u64), Arc<dyn Algorithm>>>,
    frozen: bool,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an algorithm. Idempotent on identical `(id, version)` pairs
    /// but warns on replacement; rejected after `freeze`.
    pub fn register(&mut self, algorithm: Arc<dyn Algorithm>) -> Result<(), AlgoError> {
        if self.frozen {
            return Err(AlgoError::RegistryFrozen);
        }
        let id = algorithm.id().to_string();
        let version = parse_semver(algorithm.version())?;
        let versions = self.algorithms.entry(id.clone()).or_default();
        if versions.insert(version, algorithm.clone()).is_some() {
            warn!(algorithm_id = %id, version = %algorithm.version(), "replacing algorithm in registry");
        } else {
            info!(algorithm_id = %id, version = %algorithm.version(), "registered algorithm");
        }
        Ok(())
    }

    /// Lock the registry against further registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Retrieve by id and optional version. With no version, returns the
    /// latest registered version (sorted semver).
    pub fn get(&self, algorithm_id: &str, version: Option<&str>) -> Option<Arc<dyn Algorithm>> {
        let versions = self.algorithms.get(algorithm_id)?;
        match version {
            Some(v) => {
                let key = parse_semver(v).ok()?;
                versions.get(&key).cloned()
            }
            None => versions.values().next_back().cloned(),
        }
    }

    /// Metadata for all registered algorithms, sorted by (id, version).
    pub fn list(&self) -> Vec<AlgorithmInfo> {
        self.algorithms
            .values()
            .flat_map(|versions| versions.values())
            .map(|a| AlgorithmInfo {
                algorithm_id: a.id().to_string(),
                version: a.version().to_string(),
                description: a.description().to_string(),
            })
            .collect()
    }

    /// All registered algorithm ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.algorithms.keys().cloned().collect()
    }
}

/// Registry with the seven built-in algorithms registered and frozen.
pub fn builtin_registry() -> AlgorithmRegistry {
    let mut registry = AlgorithmRegistry::new();
    crate::algorithms::register_builtins(&mut registry)
        .expect("built-in algorithm versions are valid");
    registry.freeze();
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AlgoContext, AlgorithmOutput};
    use ev_core::envelope::AlgorithmParams;

    struct Fake(&'static str, &'static str);

    impl Algorithm for Fake {
        fn id(&self) -> &'static str {
            self.0
        }
        fn version(&self) -> &'static str {
            self.1
        }
        fn description(&self) -> &'static str {
            "fake"
        }
        fn execute(
            &self,
            _params: &AlgorithmParams,
            _ctx: &AlgoContext<'_>,
        ) -> Result<AlgorithmOutput, AlgoError> {
            unreachable!("registry tests never execute")
        }
    }

    #[test]
    fn latest_version_wins_without_explicit_version() {
        let mut r = AlgorithmRegistry::new();
        r.register(Arc::new(Fake("demo", "1.0.0"))).unwrap();
        r.register(Arc::new(Fake("demo", "1.10.0"))).unwrap();
        r.register(Arc::new(Fake("demo", "1.2.0"))).unwrap();
        // Numeric semver ordering, not lexicographic: 1.10.0 > 1.2.0.
        assert_eq!(r.get("demo", None).unwrap().version(), "1.10.0");
        assert_eq!(r.get("demo", Some("1.2.0")).unwrap().version(), "1.2.0");
        assert!(r.get("demo", Some("9.9.9")).is_none());
        assert!(r.get("absent", None).is_none());
    }

    #[test]
    fn freeze_blocks_registration() {
        let mut r = AlgorithmRegistry::new();
        r.register(Arc::new(Fake("demo", "1.0.0"))).unwrap();
        r.freeze();
        assert!(matches!(
            r.register(Arc::new(Fake("late", "1.0.0"))),
            Err(AlgoError::RegistryFrozen)
        ));
        assert!(r.get("demo", None).is_some());
    }

    #[test]
    fn malformed_version_rejected() {
        let mut r = AlgorithmRegistry::new();
        assert!(r.register(Arc::new(Fake("demo", "1.0"))).is_err());
        assert!(r.register(Arc::new(Fake("demo", "1.0.0.0"))).is_err());
        assert!(r.register(Arc::new(Fake("demo", "one"))).is_err());
    }

    #[test]
    fn builtins_register_and_freeze() {
        let r = builtin_registry();
        assert!(r.is_frozen());
        let ids = r.ids();
        for expected in [
            "access_anomaly",
            "bates_generator",
            "bulk_dedup",
            "integrity_sweep",
            "provenance_graph",
            "redaction_verify",
            "timeline_alignment",
        ] {
            assert!(ids.iter().any(|i| i == expected), "missing {expected}");
        }
    }
}
