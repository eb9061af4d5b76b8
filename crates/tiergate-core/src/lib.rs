//! TierGate Core Library
//!
//! Routes a proposed change to a review tier, consults a council of
//! reviewers within that tier's time budget, and aggregates their opinions
//! (and, on the exhaustive tier, analysis results) into an auditable
//! decision.

pub mod adapter;
pub mod aggregator;
pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod consultant;
pub mod domain;
pub mod error;
pub mod judgment;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod pipeline;
pub mod reporting;
pub mod state;
pub mod telemetry;

pub use adapter::{
    AdapterPenalties, AnalysisEngine, AnalysisPayload, AnalysisReport, AnalysisResultAdapter,
    AnalysisTarget,
};
pub use aggregator::DecisionAggregator;
pub use classifier::{classify, classify_with, explain, Classification, ClassificationRule};
pub use collaborators::{
    read_audit_record, AuditRecord, CommitExecutor, DryRunCommitExecutor, GitCommitExecutor,
    JsonFileReportSink, LogNotifier, Notifier, ReportSink,
};
pub use config::GateConfig;
pub use consultant::{Consultant, ConsultantFocus, ConsultantRegistry};
pub use domain::{
    Category, ChangeContext, ChangeContextBuilder, Decision, DecisionOutcome, EngineStatus,
    Opinion, PipelineId, PipelineState, PipelineStatus, RejectionReason, ScoreContribution, Tier,
    Urgency, Verdict,
};
pub use error::{GateError, GateResult};
pub use judgment::{Consensus, Judgment, QualityJudgmentEngine};
pub use orchestrator::ConsultationOrchestrator;
pub use pipeline::{GatePipeline, GatePipelineBuilder};
pub use reporting::ReportDispatcher;
pub use state::PipelineStateStore;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
