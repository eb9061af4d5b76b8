//! Pipeline service: the entry point that ties classification, consultation,
//! aggregation or judgment, state, reporting, and commit together.
//!
//! `submit` returns as soon as the run is registered. The run itself is a
//! spawned task raced against the pipeline's cancellation signal, so a
//! cancelled run drops (and aborts) whatever consultations were in flight.
//! A run is settled once its audit record is queued and its commit handoff
//! has returned; `wait` and `shutdown` block on that, not on the status.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use crate::adapter::{AnalysisEngine, AnalysisReport, AnalysisResultAdapter, AnalysisTarget};
use crate::aggregator::DecisionAggregator;
use crate::classifier::{self, Classification};
use crate::collaborators::{
    AuditRecord, CommitExecutor, JsonFileReportSink, Notifier, ReportSink,
};
use crate::config::GateConfig;
use crate::consultant::ConsultantRegistry;
use crate::domain::{
    ChangeContext, Decision, DecisionOutcome, PipelineId, PipelineState, PipelineStatus, Tier,
    Verdict,
};
use crate::error::{GateError, GateResult};
use crate::judgment::QualityJudgmentEngine;
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::ConsultationOrchestrator;
use crate::reporting::ReportDispatcher;
use crate::state::PipelineStateStore;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`GatePipeline`].
pub struct GatePipelineBuilder {
    config: GateConfig,
    registry: Option<ConsultantRegistry>,
    engines: Vec<Arc<dyn AnalysisEngine>>,
    analysis_root: PathBuf,
    committer: Option<Arc<dyn CommitExecutor>>,
    notifiers: Vec<Arc<dyn Notifier>>,
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl GatePipelineBuilder {
    /// Replace the built-in consultants.
    pub fn registry(mut self, registry: ConsultantRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Directory analysis engines run in. Defaults to the current directory.
    pub fn analysis_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.analysis_root = root.into();
        self
    }

    pub fn commit_executor(mut self, committer: Arc<dyn CommitExecutor>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validate the configuration and start the reporting worker. Must be
    /// called from within a Tokio runtime.
    pub fn build(self) -> GateResult<GatePipeline> {
        let config = self.config;
        config.validate()?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => ConsultantRegistry::with_defaults(&config.consultants)?,
        };
        let judgment = QualityJudgmentEngine::new(config.judgment.clone())?;

        let mut sinks = self.sinks;
        if let Some(dir) = &config.pipeline.report_dir {
            sinks.push(Arc::new(JsonFileReportSink::new(dir)));
        }
        let reports = ReportDispatcher::spawn(
            config.pipeline.report_queue_capacity,
            config.pipeline.report_timeout(),
            self.notifiers,
            sinks,
        );

        info!(
            consultants = ?registry.ids(),
            engines = self.engines.len(),
            commit = self.committer.is_some(),
            "gate pipeline ready"
        );

        Ok(GatePipeline {
            inner: Arc::new(Inner {
                orchestrator: ConsultationOrchestrator::new(config.orchestration.clone()),
                aggregator: DecisionAggregator::new(config.aggregation.clone()),
                adapter: AnalysisResultAdapter::new(config.adapter.clone()),
                judgment,
                registry,
                engines: self.engines,
                analysis_root: self.analysis_root,
                committer: self.committer,
                reports,
                store: PipelineStateStore::new(),
                runs: Mutex::new(HashMap::new()),
                config,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct GatePipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: GateConfig,
    registry: ConsultantRegistry,
    orchestrator: ConsultationOrchestrator,
    aggregator: DecisionAggregator,
    adapter: AnalysisResultAdapter,
    judgment: QualityJudgmentEngine,
    engines: Vec<Arc<dyn AnalysisEngine>>,
    analysis_root: PathBuf,
    committer: Option<Arc<dyn CommitExecutor>>,
    reports: ReportDispatcher,
    store: PipelineStateStore,
    /// Unsettled runs. The sender half lives in the run task and closes when
    /// it ends.
    runs: Mutex<HashMap<PipelineId, watch::Receiver<()>>>,
}

impl GatePipeline {
    pub fn builder(config: GateConfig) -> GatePipelineBuilder {
        GatePipelineBuilder {
            config,
            registry: None,
            engines: Vec::new(),
            analysis_root: PathBuf::from("."),
            committer: None,
            notifiers: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Tier the change would be routed to, with the matching rule.
    pub fn classify(&self, ctx: &ChangeContext) -> Classification {
        classifier::explain(&self.inner.config.classifier, ctx)
    }

    /// Start a run and return its id without waiting for the decision.
    pub fn submit(&self, ctx: ChangeContext) -> GateResult<PipelineId> {
        self.submit_with_analysis(ctx, Vec::new())
    }

    /// Like [`submit`](Self::submit), with externally produced analysis
    /// reports for the judgment path. Reports are only used when the change
    /// lands on the exhaustive tier.
    pub fn submit_with_analysis(
        &self,
        ctx: ChangeContext,
        analysis: Vec<AnalysisReport>,
    ) -> GateResult<PipelineId> {
        let inner = &self.inner;
        let classification = self.classify(&ctx);
        let tier = classification.tier;
        let reason = classification.describe(&ctx);

        let id = inner.store.create(tier);
        METRICS.inc_pipelines_submitted();
        obs::emit_pipeline_submitted(id, ctx.file_count(), ctx.complexity());
        obs::emit_pipeline_classified(id, tier, &reason);
        inner.store.set_stage(id, "classified")?;
        let cancel_rx = inner.store.subscribe(id)?;

        let (settled_tx, settled_rx) = watch::channel(());
        inner.lock_runs().insert(id, settled_rx);

        let this = Arc::clone(inner);
        let run = async move {
            Arc::clone(&this)
                .drive(id, Arc::new(ctx), reason, tier, analysis, cancel_rx)
                .await;
            this.lock_runs().remove(&id);
            drop(settled_tx);
        };
        tokio::spawn(run.instrument(obs::pipeline_span(id, tier)));
        Ok(id)
    }

    pub fn get_status(&self, id: PipelineId) -> GateResult<PipelineState> {
        self.inner.store.get(id)
    }

    /// Cancel a running pipeline. Returns `false` if it had already reached a
    /// terminal state, in which case nothing changes.
    pub fn cancel(&self, id: PipelineId, reason: &str) -> GateResult<bool> {
        let cancelled = self.inner.store.cancel(id, reason)?;
        if cancelled {
            obs::emit_pipeline_cancelled(id, reason);
        } else {
            debug!(pipeline_id = %id, "cancel ignored; pipeline already finished");
        }
        Ok(cancelled)
    }

    /// Wait for a pipeline to reach a terminal state and for its run to
    /// settle, so the audit record is queued and any commit has happened.
    pub async fn wait(&self, id: PipelineId) -> GateResult<DecisionOutcome> {
        let mut rx = self.inner.store.subscribe(id)?;
        let settled = self.inner.lock_runs().get(&id).cloned();
        if let Some(settled) = settled {
            settle(settled).await;
        }
        rx.wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| GateError::System(format!("status channel for {id} closed")))?;
        let state = self.inner.store.get(id)?;
        Ok(state.outcome().unwrap_or(DecisionOutcome::Error))
    }

    /// Submit and wait; returns the final state.
    pub async fn review(&self, ctx: ChangeContext) -> GateResult<PipelineState> {
        let id = self.submit(ctx)?;
        self.wait(id).await?;
        self.inner.store.get(id)
    }

    /// Wait for every in-flight run to settle, then drain queued reports.
    /// Cancel runs that should not be waited for before calling this.
    pub async fn shutdown(&self) {
        let pending: Vec<_> = self.inner.lock_runs().values().cloned().collect();
        debug!(runs = pending.len(), "waiting for in-flight runs");
        for settled in pending {
            settle(settled).await;
        }
        self.inner.reports.shutdown().await;
    }
}

impl std::fmt::Debug for GatePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePipeline")
            .field("registry", &self.inner.registry)
            .field("engines", &self.inner.engines.len())
            .field("store", &self.inner.store)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Resolves once the run task holding the sender has ended.
async fn settle(mut settled: watch::Receiver<()>) {
    while settled.changed().await.is_ok() {}
}

impl Inner {
    fn lock_runs(&self) -> std::sync::MutexGuard<'_, HashMap<PipelineId, watch::Receiver<()>>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn drive(
        self: Arc<Self>,
        id: PipelineId,
        ctx: Arc<ChangeContext>,
        reason: String,
        tier: Tier,
        analysis: Vec<AnalysisReport>,
        mut cancel_rx: watch::Receiver<PipelineStatus>,
    ) {
        let cancelled = async move {
            // A closed channel means the store is gone; stop either way.
            let _ = cancel_rx
                .wait_for(|s| *s == PipelineStatus::Cancelled)
                .await;
        };

        let result = tokio::select! {
            biased;
            _ = cancelled => {
                debug!("run abandoned after cancellation");
                return;
            }
            result = self.decide(id, Arc::clone(&ctx), tier, analysis) => result,
        };

        match result {
            Ok(decision) => {
                let decision = decision.with_classification(reason.clone());
                self.record(id, &ctx, reason, decision).await
            }
            Err(e) => {
                warn!(error = %e, "pipeline failed");
                if let Err(e) = self.store.fail(id, &e.to_string()) {
                    debug!(error = %e, "could not mark pipeline failed");
                }
            }
        }
    }

    async fn decide(
        &self,
        id: PipelineId,
        ctx: Arc<ChangeContext>,
        tier: Tier,
        analysis: Vec<AnalysisReport>,
    ) -> GateResult<Decision> {
        self.store.set_stage(id, "consulting")?;
        let opinions = self
            .orchestrator
            .run(tier, Arc::clone(&ctx), &self.registry)
            .await;

        let judged = tier == Tier::Exhaustive && !(analysis.is_empty() && self.engines.is_empty());
        if !judged {
            self.store.set_stage(id, "aggregating")?;
            return Ok(self.aggregator.decide(tier, &opinions));
        }

        self.store.set_stage(id, "analyzing")?;
        let mut reports = analysis;
        if !self.engines.is_empty() {
            let target = Arc::new(AnalysisTarget::for_change(&self.analysis_root, &ctx));
            reports.extend(self.orchestrator.run_engines(&self.engines, target).await);
        }
        let contributions = self.adapter.normalize_all(&reports);

        self.store.set_stage(id, "judging")?;
        let judgment = self.judgment.judge(&contributions, &opinions)?;
        debug!(
            composite = judgment.composite,
            consensus = %judgment.consensus,
            "judgment complete"
        );
        Ok(judgment.decision)
    }

    async fn record(&self, id: PipelineId, ctx: &ChangeContext, reason: String, decision: Decision) {
        match self.store.complete(id, decision.clone()) {
            Ok(()) => {}
            Err(GateError::InvalidTransition { from, .. }) => {
                debug!(%from, "pipeline finished elsewhere; discarding decision");
                return;
            }
            Err(e) => {
                warn!(error = %e, "could not record decision");
                return;
            }
        }

        obs::emit_decision_issued(id, &decision);
        if decision.approved() {
            METRICS.inc_decisions_approved();
        } else {
            METRICS.inc_decisions_rejected();
        }

        self.reports
            .dispatch(AuditRecord::new(id, ctx.clone(), reason, decision.clone()));
        self.commit(ctx, &decision).await;
    }

    async fn commit(&self, ctx: &ChangeContext, decision: &Decision) {
        let Some(committer) = &self.committer else {
            return;
        };
        let eligible = match decision.verdict() {
            Verdict::Approved => true,
            Verdict::ConditionalApproved => self.config.pipeline.commit_on_conditional,
            Verdict::Rejected => false,
        };
        if !eligible {
            debug!(verdict = %decision.verdict(), "not committing");
            return;
        }

        // The fast tier already ran its own gate.
        let bypass_checks = decision.tier() == Tier::Fast;
        match committer.execute(ctx, bypass_checks).await {
            Ok(true) => info!(decision_id = %decision.id(), bypass_checks, "change committed"),
            Ok(false) => warn!(decision_id = %decision.id(), "commit executor reported failure"),
            Err(e) => warn!(decision_id = %decision.id(), error = %e, "commit executor failed"),
        }
    }
}
