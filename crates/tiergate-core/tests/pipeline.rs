use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tiergate_core::metrics::METRICS;
use tiergate_core::{
    read_audit_record, AnalysisPayload, AnalysisReport, AuditRecord, Category, ChangeContext,
    CommitExecutor, Consultant, ConsultantFocus, ConsultantRegistry, DecisionOutcome,
    EngineStatus, GateConfig, GateError, GatePipeline, Opinion, PipelineId, PipelineStatus,
    ReportSink, Tier, Urgency, Verdict,
};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct Scripted {
    id: &'static str,
    focus: ConsultantFocus,
    approve: bool,
    risk: f64,
    delay: Duration,
}

impl Scripted {
    fn approving(id: &'static str) -> Arc<dyn Consultant> {
        Arc::new(Self {
            id,
            focus: ConsultantFocus::General,
            approve: true,
            risk: 0.1,
            delay: Duration::ZERO,
        })
    }

    fn risk(approve: bool, risk: f64, delay: Duration) -> Arc<dyn Consultant> {
        Arc::new(Self {
            id: "risk-analysis",
            focus: ConsultantFocus::Risk,
            approve,
            risk,
            delay,
        })
    }
}

#[async_trait]
impl Consultant for Scripted {
    fn id(&self) -> &str {
        self.id
    }

    fn focus(&self) -> ConsultantFocus {
        self.focus
    }

    async fn consult(&self, _ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Opinion::new(self.id, self.approve, "scripted", self.risk, Utc::now()))
    }
}

/// Never answers; flips `dropped` when its call is torn down.
struct Hanging {
    started: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Consultant for Hanging {
    fn id(&self) -> &str {
        "hanging"
    }

    async fn consult(&self, _ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        let _guard = SetOnDrop(Arc::clone(&self.dropped));
        self.started.store(true, Ordering::SeqCst);
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Blocks its worker thread, so aborting it has no effect.
struct Blocking;

#[async_trait]
impl Consultant for Blocking {
    fn id(&self) -> &str {
        "risk-analysis"
    }

    fn focus(&self) -> ConsultantFocus {
        ConsultantFocus::Risk
    }

    async fn consult(&self, _ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        std::thread::sleep(Duration::from_millis(400));
        Ok(Opinion::new("risk-analysis", true, "late", 0.0, Utc::now()))
    }
}

struct RecordingCommitter(mpsc::UnboundedSender<bool>);

#[async_trait]
impl CommitExecutor for RecordingCommitter {
    async fn execute(&self, _change: &ChangeContext, bypass_checks: bool) -> anyhow::Result<bool> {
        self.0.send(bypass_checks)?;
        Ok(true)
    }
}

/// Takes a while to commit, then records that it did.
struct SlowCommitter(Arc<AtomicBool>);

#[async_trait]
impl CommitExecutor for SlowCommitter {
    async fn execute(&self, _change: &ChangeContext, _bypass_checks: bool) -> anyhow::Result<bool> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.store(true, Ordering::SeqCst);
        Ok(true)
    }
}

#[derive(Default)]
struct CountingSink(AtomicUsize);

#[async_trait]
impl ReportSink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    async fn write(&self, _record: &AuditRecord) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct MemorySink(Mutex<Vec<AuditRecord>>);

#[async_trait]
impl ReportSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn change(urgency: Urgency, files: usize, complexity: f64) -> ChangeContext {
    ChangeContext::builder(urgency)
        .files((0..files).map(|i| format!("src/module_{i}.rs")))
        .complexity(complexity)
        .description("pipeline test")
        .build()
        .expect("valid change")
}

fn council(n: usize) -> ConsultantRegistry {
    const IDS: [&str; 5] = ["alpha", "bravo", "charlie", "delta", "echo"];
    IDS.iter()
        .take(n)
        .fold(ConsultantRegistry::new(), |r, id| r.with(Scripted::approving(id)))
}

fn clean_reports() -> Vec<AnalysisReport> {
    vec![
        AnalysisReport {
            engine: "clippy".to_string(),
            status: EngineStatus::Completed,
            payload: AnalysisPayload::Lint {
                errors: 0,
                warnings: 0,
                files_checked: 12,
            },
        },
        AnalysisReport {
            engine: "cargo-test".to_string(),
            status: EngineStatus::Completed,
            payload: AnalysisPayload::Tests {
                passed: 40,
                failed: 0,
                skipped: 1,
            },
        },
        AnalysisReport {
            engine: "cargo-audit".to_string(),
            status: EngineStatus::Completed,
            payload: AnalysisPayload::Security {
                critical: 0,
                high: 0,
                medium: 0,
                low: 0,
            },
        },
    ]
}

fn scored(score: f64) -> Vec<AnalysisReport> {
    [Category::Lint, Category::Tests, Category::Security]
        .into_iter()
        .map(|category| AnalysisReport {
            engine: format!("{category}-engine"),
            status: EngineStatus::Completed,
            payload: AnalysisPayload::Score {
                category,
                score,
                issues: 0,
            },
        })
        .collect()
}

fn stages(pipeline: &GatePipeline, id: PipelineId) -> Vec<String> {
    pipeline
        .get_status(id)
        .unwrap()
        .history
        .into_iter()
        .map(|t| t.stage)
        .collect()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn standard_change_is_approved_with_stage_history() {
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(4))
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Normal, 10, 0.5))
        .await
        .unwrap();
    assert_eq!(state.tier, Tier::Standard);
    assert_eq!(state.status, PipelineStatus::Completed);
    assert_eq!(state.outcome(), Some(DecisionOutcome::Approved));

    let decision = state.decision.as_ref().unwrap();
    assert_eq!(decision.opinions().len(), 4);
    assert!(decision.reasoning()[0].starts_with("tier standard"));
    assert_eq!(
        stages(&pipeline, state.id),
        ["created", "classified", "consulting", "aggregating", "completed"]
    );
}

#[tokio::test(start_paused = true)]
async fn fast_tier_timeout_fails_closed() {
    let registry = ConsultantRegistry::new().with(Scripted::risk(true, 0.0, Duration::from_secs(10)));
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(registry)
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Emergency, 2, 0.1))
        .await
        .unwrap();
    assert_eq!(state.tier, Tier::Fast);
    assert_eq!(state.outcome(), Some(DecisionOutcome::Rejected));

    let decision = state.decision.unwrap();
    let opinion = &decision.opinions()[0];
    assert!(!opinion.approve);
    assert_eq!(opinion.risk, 1.0);
    assert!(opinion.advice.contains("1500ms"), "{}", opinion.advice);
}

#[tokio::test(start_paused = true)]
async fn standard_tier_drops_stragglers() {
    let registry = council(3).with(Arc::new(Scripted {
        id: "slowpoke",
        focus: ConsultantFocus::General,
        approve: false,
        risk: 0.9,
        delay: Duration::from_secs(120),
    }));
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(registry)
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Normal, 8, 0.4))
        .await
        .unwrap();
    let decision = state.decision.unwrap();
    assert_eq!(decision.verdict(), Verdict::Approved);
    assert!(decision.opinions().iter().all(|o| o.consultant != "slowpoke"));
}

#[tokio::test]
async fn exhaustive_change_with_analysis_is_judged() {
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(3))
        .build()
        .unwrap();

    let id = pipeline
        .submit_with_analysis(change(Urgency::Normal, 4, 0.9), clean_reports())
        .unwrap();
    assert_eq!(pipeline.wait(id).await.unwrap(), DecisionOutcome::Approved);

    let state = pipeline.get_status(id).unwrap();
    let decision = state.decision.unwrap();
    assert_eq!(decision.tier(), Tier::Exhaustive);
    assert_eq!(decision.contributions().len(), 3);
    assert_eq!(decision.certification(), Some("distinguished"));
    assert!(decision.composite_score().is_some());
    let history = stages(&pipeline, id);
    assert!(history.contains(&"analyzing".to_string()));
    assert!(history.contains(&"judging".to_string()));
}

#[tokio::test]
async fn exhaustive_change_without_analysis_is_aggregated() {
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(4))
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Emergency, 30, 0.3))
        .await
        .unwrap();
    assert_eq!(state.tier, Tier::Exhaustive);
    assert_eq!(state.outcome(), Some(DecisionOutcome::Approved));
    assert!(stages(&pipeline, state.id).contains(&"aggregating".to_string()));
    assert_eq!(state.decision.unwrap().composite_score(), None);
}

#[tokio::test]
async fn judgment_fault_surfaces_as_error() {
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(3))
        .build()
        .unwrap();

    let id = pipeline
        .submit_with_analysis(change(Urgency::Normal, 4, 0.9), scored(f64::NAN))
        .unwrap();
    assert_eq!(pipeline.wait(id).await.unwrap(), DecisionOutcome::Error);

    let state = pipeline.get_status(id).unwrap();
    assert_eq!(state.status, PipelineStatus::Failed);
    assert!(state.decision.is_none());
    assert!(state.error.unwrap().contains("non-finite"));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_aborts_in_flight_consultations() {
    let started = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let registry = council(2).with(Arc::new(Hanging {
        started: Arc::clone(&started),
        dropped: Arc::clone(&dropped),
    }));
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(registry)
        .build()
        .unwrap();

    let id = pipeline.submit(change(Urgency::Normal, 6, 0.4)).unwrap();
    while !started.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }
    assert_eq!(pipeline.get_status(id).unwrap().stage, "consulting");

    assert!(pipeline.cancel(id, "superseded by a newer revision").unwrap());
    assert_eq!(pipeline.wait(id).await.unwrap(), DecisionOutcome::Cancelled);
    assert!(!pipeline.cancel(id, "again").unwrap());

    for _ in 0..100 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(dropped.load(Ordering::SeqCst), "consultation still running");

    let state = pipeline.get_status(id).unwrap();
    assert_eq!(state.status, PipelineStatus::Cancelled);
    assert!(state.decision.is_none());
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() {
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(3))
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Normal, 6, 0.4))
        .await
        .unwrap();
    assert!(!pipeline.cancel(state.id, "too late").unwrap());
    assert_eq!(
        pipeline.get_status(state.id).unwrap().status,
        PipelineStatus::Completed
    );
}

#[tokio::test]
async fn unknown_pipeline_is_not_found() {
    let pipeline = GatePipeline::builder(GateConfig::default()).build().unwrap();
    let missing = PipelineId::new();
    assert!(matches!(
        pipeline.get_status(missing),
        Err(GateError::PipelineNotFound(id)) if id == missing
    ));
    assert!(matches!(
        pipeline.cancel(missing, "nope"),
        Err(GateError::PipelineNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consultant_ignoring_cancellation_is_counted() {
    let before = METRICS.cancellation_violations();
    let mut config = GateConfig::default();
    config.orchestration.fast_budget_ms = 20;
    config.orchestration.cancellation_grace_ms = 10;
    let pipeline = GatePipeline::builder(config)
        .registry(ConsultantRegistry::new().with(Arc::new(Blocking)))
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Emergency, 1, 0.1))
        .await
        .unwrap();
    assert_eq!(state.outcome(), Some(DecisionOutcome::Rejected));
    // The aborted call is reaped in the background after the grace period.
    let counted = async {
        while METRICS.cancellation_violations() <= before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), counted)
        .await
        .expect("violation never counted");
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

async fn next_commit(rx: &mut mpsc::UnboundedReceiver<bool>) -> Option<bool> {
    tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn fast_approval_commits_with_bypass() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(ConsultantRegistry::new().with(Scripted::risk(true, 0.1, Duration::ZERO)))
        .commit_executor(Arc::new(RecordingCommitter(tx)))
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Emergency, 2, 0.1))
        .await
        .unwrap();
    assert_eq!(state.outcome(), Some(DecisionOutcome::Approved));
    assert_eq!(next_commit(&mut rx).await, Some(true));
}

#[tokio::test]
async fn standard_approval_commits_with_checks() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(3))
        .commit_executor(Arc::new(RecordingCommitter(tx)))
        .build()
        .unwrap();

    pipeline
        .review(change(Urgency::Normal, 6, 0.4))
        .await
        .unwrap();
    assert_eq!(next_commit(&mut rx).await, Some(false));
}

#[tokio::test]
async fn rejection_never_commits() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(ConsultantRegistry::new().with(Scripted::risk(false, 0.8, Duration::ZERO)))
        .commit_executor(Arc::new(RecordingCommitter(tx)))
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Emergency, 2, 0.1))
        .await
        .unwrap();
    assert_eq!(state.outcome(), Some(DecisionOutcome::Rejected));
    assert_eq!(next_commit(&mut rx).await, None);
}

#[tokio::test]
async fn conditional_approval_commits_only_when_enabled() {
    for enabled in [false, true] {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = GateConfig::default();
        config.pipeline.commit_on_conditional = enabled;
        let pipeline = GatePipeline::builder(config)
            .registry(council(3))
            .commit_executor(Arc::new(RecordingCommitter(tx)))
            .build()
            .unwrap();

        let id = pipeline
            .submit_with_analysis(change(Urgency::Normal, 4, 0.9), scored(86.0))
            .unwrap();
        assert_eq!(
            pipeline.wait(id).await.unwrap(),
            DecisionOutcome::ConditionalApproved
        );
        let committed = next_commit(&mut rx).await;
        assert_eq!(committed.is_some(), enabled, "commit_on_conditional = {enabled}");
    }
}

#[tokio::test]
async fn audit_record_matches_stored_decision() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(MemorySink::default());
    let mut config = GateConfig::default();
    config.pipeline.report_dir = Some(dir.path().to_path_buf());
    let pipeline = GatePipeline::builder(config)
        .registry(council(4))
        .sink(memory.clone())
        .build()
        .unwrap();

    let state = pipeline
        .review(change(Urgency::Normal, 10, 0.5))
        .await
        .unwrap();
    pipeline.shutdown().await;

    let stored = state.decision.unwrap();
    let on_disk = read_audit_record(dir.path(), stored.id()).unwrap();
    assert_eq!(on_disk.pipeline_id, state.id);
    assert_eq!(
        serde_json::to_vec(&on_disk.decision).unwrap(),
        serde_json::to_vec(&stored).unwrap()
    );
    assert!(on_disk.classification.starts_with("tier standard"));
    assert_eq!(memory.0.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_then_shutdown_keeps_commit_and_audit_record() {
    let sink = Arc::new(CountingSink::default());
    for round in 1..=20 {
        let committed = Arc::new(AtomicBool::new(false));
        let pipeline = GatePipeline::builder(GateConfig::default())
            .registry(ConsultantRegistry::new().with(Scripted::risk(true, 0.1, Duration::ZERO)))
            .commit_executor(Arc::new(SlowCommitter(committed.clone())))
            .sink(sink.clone())
            .build()
            .unwrap();

        let id = pipeline.submit(change(Urgency::Emergency, 1, 0.1)).unwrap();
        assert_eq!(pipeline.wait(id).await.unwrap(), DecisionOutcome::Approved);
        assert!(committed.load(Ordering::SeqCst), "round {round}: wait returned before commit");
        pipeline.shutdown().await;
        assert_eq!(sink.0.load(Ordering::SeqCst), round, "round {round}: audit record lost");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_runs_nobody_waited_on() {
    let sink = Arc::new(CountingSink::default());
    let committed = Arc::new(AtomicBool::new(false));
    let pipeline = GatePipeline::builder(GateConfig::default())
        .registry(council(3))
        .commit_executor(Arc::new(SlowCommitter(committed.clone())))
        .sink(sink.clone())
        .build()
        .unwrap();

    let ids: Vec<_> = (0..5)
        .map(|_| pipeline.submit(change(Urgency::Normal, 6, 0.4)).unwrap())
        .collect();
    pipeline.shutdown().await;

    assert!(committed.load(Ordering::SeqCst));
    assert_eq!(sink.0.load(Ordering::SeqCst), ids.len());
    for id in ids {
        assert!(pipeline.get_status(id).unwrap().status.is_terminal());
    }
}
