//! Provenance graph builder.
//!
//! Directed acyclic graph linking originals → derivatives → exports.
//! Read-only: never modifies evidence or manifests. Nodes are deduplicated
//! by hash and sorted ascending; edges sorted by (source, target) — same
//! evidence set ⇒ identical graph hash.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::CaseId;

use crate::casework::{linked_items, require_case};
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GraphNode {
    Original {
        hash: String,
        evidence_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        evidence_store_id: Option<String>,
        original_filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_size_bytes: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        collected_date: Option<String>,
    },
    Derivative {
        hash: String,
        derivative_type: String,
        filename: String,
        size_bytes: u64,
        created_at: String,
        parameters: BTreeMap<String, Value>,
    },
    Export {
        hash: String,
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actor: Option<String>,
    },
}

impl GraphNode {
    fn hash(&self) -> &str {
        match self {
            GraphNode::Original { hash, .. }
            | GraphNode::Derivative { hash, .. }
            | GraphNode::Export { hash, .. } => hash,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            GraphNode::Original { .. } => "original",
            GraphNode::Derivative { .. } => "derivative",
            GraphNode::Export { .. } => "export",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GraphEdge {
    source_hash: String,
    target_hash: String,
    transformation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Serialize)]
struct GraphStatistics {
    total_nodes: u64,
    total_edges: u64,
    originals: u64,
    derivatives: u64,
    exports: u64,
}

#[derive(Debug, Serialize)]
struct ProvenanceReport {
    case_id: CaseId,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    statistics: GraphStatistics,
}

pub struct ProvenanceGraph;

impl Algorithm for ProvenanceGraph {
    fn id(&self) -> &'static str {
        "provenance_graph"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Build a provenance graph linking originals, derivatives, and exports."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;
        let items = linked_items(params, ctx)?;
        let custody = ctx.db.list_custody(params.case_id, None)?;

        let mut nodes: Vec<GraphNode> = Vec::new();
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut input_hashes = Vec::new();

        for item in &items {
            let Some(original_hash) = &item.sha256 else { continue };
            input_hashes.push(original_hash.as_str().to_string());

            nodes.push(GraphNode::Original {
                hash: original_hash.as_str().to_string(),
                evidence_id: item.db_id,
                evidence_store_id: item.evidence_store_id.as_ref().map(|i| i.to_string()),
                original_filename: item.original_filename.clone(),
                file_type: item.file_type.clone(),
                file_size_bytes: item.file_size_bytes,
                collected_date: item.collected_date.clone(),
            });

            // Derivative nodes/edges from the manifest.
            if let Some(evidence_id) = &item.evidence_store_id {
                if let Some(manifest) = ctx.store.load_manifest(evidence_id)? {
                    for derivative in &manifest.derivatives {
                        nodes.push(GraphNode::Derivative {
                            hash: derivative.sha256.as_str().to_string(),
                            derivative_type: derivative.derivative_type.clone(),
                            filename: derivative.filename.clone(),
                            size_bytes: derivative.size_bytes,
                            created_at: derivative.created_at.clone(),
                            parameters: derivative.parameters.clone(),
                        });
                        edges.push(GraphEdge {
                            source_hash: original_hash.as_str().to_string(),
                            target_hash: derivative.sha256.as_str().to_string(),
                            transformation: derivative.derivative_type.clone(),
                            parameters: Some(derivative.parameters.clone()),
                        });
                    }
                }
            }

            // Export nodes/edges from export-action custody entries whose
            // hash_after differs from the original.
            let item_key = item.db_id.to_string();
            for record in custody
                .iter()
                .filter(|r| r.evidence_id == item_key && r.action.contains("export"))
            {
                let Some(hash_after) = &record.hash_after else { continue };
                if hash_after == original_hash.as_str() {
                    continue;
                }
                nodes.push(GraphNode::Export {
                    hash: hash_after.clone(),
                    action: record.action.clone(),
                    timestamp: Some(record.timestamp.clone()),
                    actor: record.actor_name.clone(),
                });
                edges.push(GraphEdge {
                    source_hash: original_hash.as_str().to_string(),
                    target_hash: hash_after.clone(),
                    transformation: record.action.clone(),
                    parameters: None,
                });
            }
        }

        // Deduplicate nodes by hash, then sort for determinism.
        let mut seen = BTreeSet::new();
        let mut unique_nodes: Vec<GraphNode> = Vec::new();
        for node in nodes {
            if seen.insert(node.hash().to_string()) {
                unique_nodes.push(node);
            }
        }
        unique_nodes.sort_by(|a, b| a.hash().cmp(b.hash()));
        edges.sort_by(|a, b| {
            (a.source_hash.as_str(), a.target_hash.as_str())
                .cmp(&(b.source_hash.as_str(), b.target_hash.as_str()))
        });

        let mut type_counts: BTreeMap<&str, u64> = BTreeMap::new();
        for node in &unique_nodes {
            *type_counts.entry(node.type_name()).or_default() += 1;
        }

        let report = ProvenanceReport {
            case_id: params.case_id,
            statistics: GraphStatistics {
                total_nodes: unique_nodes.len() as u64,
                total_edges: edges.len() as u64,
                originals: type_counts.get("original").copied().unwrap_or(0),
                derivatives: type_counts.get("derivative").copied().unwrap_or(0),
                exports: type_counts.get("export").copied().unwrap_or(0),
            },
            nodes: unique_nodes,
            edges,
        };

        super::report_output(&report, "graph_hash", input_hashes, Vec::new(), Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_tags_serialize_snake_case() {
        let node = GraphNode::Export {
            hash: "ab".into(),
            action: "export_zip".into(),
            timestamp: None,
            actor: None,
        };
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(v["type"], "export");
        assert_eq!(v["hash"], "ab");
    }

    #[test]
    fn node_hash_accessor_covers_variants() {
        let node = GraphNode::Derivative {
            hash: "cd".into(),
            derivative_type: "thumbnail".into(),
            filename: "t.png".into(),
            size_bytes: 1,
            created_at: "2026-01-01T00:00:00.000000Z".into(),
            parameters: BTreeMap::new(),
        };
        assert_eq!(node.hash(), "cd");
        assert_eq!(node.type_name(), "derivative");
    }
}
