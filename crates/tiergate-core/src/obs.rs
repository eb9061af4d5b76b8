//! Structured observability hooks for the pipeline lifecycle.
//!
//! Events are emitted at `info!` level (`warn!` for contract violations)
//! with an `event` field naming them, e.g. `event=decision.issued`.

use tracing::{info, warn};

use crate::domain::{Decision, PipelineId, Tier};

/// Span covering one pipeline run. Attach with `Instrument::instrument`
/// so it follows the run task across await points.
pub fn pipeline_span(id: PipelineId, tier: Tier) -> tracing::Span {
    tracing::info_span!("tiergate.pipeline", pipeline_id = %id, tier = %tier)
}

pub fn emit_pipeline_submitted(id: PipelineId, files: usize, complexity: f64) {
    info!(event = "pipeline.submitted", pipeline_id = %id, files, complexity);
}

pub fn emit_pipeline_classified(id: PipelineId, tier: Tier, reason: &str) {
    info!(event = "pipeline.classified", pipeline_id = %id, tier = %tier, reason = %reason);
}

pub fn emit_consultation_finished(tier: Tier, requested: usize, returned: usize, elapsed_ms: u64) {
    info!(
        event = "consultation.finished",
        tier = %tier,
        requested,
        returned,
        elapsed_ms,
    );
}

pub fn emit_decision_issued(id: PipelineId, decision: &Decision) {
    info!(
        event = "decision.issued",
        pipeline_id = %id,
        decision_id = %decision.id(),
        tier = %decision.tier(),
        verdict = %decision.verdict(),
        composite = decision.composite_score(),
        certification = decision.certification(),
    );
}

pub fn emit_pipeline_cancelled(id: PipelineId, reason: &str) {
    info!(event = "pipeline.cancelled", pipeline_id = %id, reason = %reason);
}

pub fn emit_consultant_timeout(consultant: &str, budget_ms: u64) {
    warn!(event = "consultant.timeout", consultant = %consultant, budget_ms);
}

pub fn emit_cancellation_ignored(consultant: &str, grace_ms: u64) {
    warn!(
        event = "consultant.cancellation_ignored",
        consultant = %consultant,
        grace_ms,
        "consultant ignored cancellation; contract violation"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_span_create() {
        let span = pipeline_span(PipelineId::new(), Tier::Standard);
        let _guard = span.enter();
        emit_pipeline_cancelled(PipelineId::new(), "test");
    }
}
