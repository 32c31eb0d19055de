//! Runtime context handed to every algorithm run.

use serde_json::Value;
use tracing::warn;

use ev_core::external::{AuditSink, CaseDb};
use ev_store::EvidenceStore;

use crate::codec::PdfCodec;

/// Capability set an algorithm may use: the evidence store, the relational
/// context, an optional audit sink, and an optional PDF codec runner.
///
/// `replay_mode` suppresses derivative writes so replay stays
/// non-destructive; algorithms that store derivatives must check it.
pub struct AlgoContext<'a> {
    pub store: &'a EvidenceStore,
    pub db: &'a dyn CaseDb,
    pub audit: Option<&'a dyn AuditSink>,
    pub pdf: Option<&'a dyn PdfCodec>,
    pub replay_mode: bool,
}

impl<'a> AlgoContext<'a> {
    pub fn new(store: &'a EvidenceStore, db: &'a dyn CaseDb) -> Self {
        Self {
            store,
            db,
            audit: None,
            pdf: None,
            replay_mode: false,
        }
    }

    pub fn with_audit(mut self, audit: &'a dyn AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_pdf(mut self, pdf: &'a dyn PdfCodec) -> Self {
        self.pdf = Some(pdf);
        self
    }

    pub fn replay(mut self) -> Self {
        self.replay_mode = true;
        self
    }

    /// Best-effort audit emission: failures are logged, never propagated to
    /// the algorithm caller.
    pub fn emit_audit(
        &self,
        evidence_id: &str,
        action: &str,
        actor_id: Option<u64>,
        actor_name: Option<&str>,
        details: &Value,
    ) {
        if let Some(sink) = self.audit {
            if let Err(e) = sink.record(evidence_id, action, actor_id, actor_name, details) {
                warn!(evidence_id, action, error = %e, "audit emit failed");
            }
        }
    }
}
