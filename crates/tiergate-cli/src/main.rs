//! TierGate CLI
//!
//! The `tiergate` command routes a proposed change through the tiered review
//! gate and reports the decision.
//!
//! ## Commands
//!
//! - `classify`: Show which tier a change would be reviewed at
//! - `review`: Run the full gate pipeline on a change
//! - `judge`: Score stored analysis results and opinions
//! - `verify-report`: Check an audit record against its digest
//!
//! Exit codes follow the outcome: 0 approved, 2 conditionally approved,
//! 3 rejected, 4 cancelled, 1 on any error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, Level};
use uuid::Uuid;

use tiergate_core::metrics::METRICS;
use tiergate_core::telemetry::init_tracing;
use tiergate_core::{
    read_audit_record, AnalysisReport, AnalysisResultAdapter, ChangeContext, DecisionOutcome,
    DryRunCommitExecutor, GateConfig, GatePipeline, GitCommitExecutor, LogNotifier, Opinion,
    QualityJudgmentEngine,
};

#[derive(Parser)]
#[command(name = "tiergate")]
#[command(version = tiergate_core::VERSION)]
#[command(about = "Tiered multi-agent review gate for code changes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Gate configuration file (TOML)
    #[arg(long, global = true, env = "TIERGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tier a change would be reviewed at
    Classify {
        /// Change description (JSON)
        #[arg(short, long)]
        context: PathBuf,
    },

    /// Review a change and print the final pipeline state
    Review {
        /// Change description (JSON)
        #[arg(short, long)]
        context: PathBuf,

        /// Analysis reports to judge against (JSON array)
        #[arg(short, long)]
        analysis: Option<PathBuf>,

        /// Write audit records under this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Commit the change if it is approved
        #[arg(long)]
        commit: bool,

        /// Log the commit instead of running git
        #[arg(long, requires = "commit")]
        dry_run: bool,

        /// Repository to commit in
        #[arg(long, default_value = ".")]
        git_dir: PathBuf,
    },

    /// Judge stored analysis reports and consultant opinions
    Judge {
        /// Analysis reports (JSON array)
        #[arg(short, long)]
        analysis: PathBuf,

        /// Consultant opinions (JSON array)
        #[arg(short, long)]
        opinions: Option<PathBuf>,
    },

    /// Verify an audit record's digest and print it
    VerifyReport {
        /// Audit record root directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Decision id
        #[arg(long)]
        decision: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    let code = match cli.command {
        Commands::Classify { context } => cmd_classify(config, &context)?,
        Commands::Review {
            context,
            analysis,
            report_dir,
            commit,
            dry_run,
            git_dir,
        } => {
            let commit = commit.then_some(if dry_run {
                CommitMode::DryRun
            } else {
                CommitMode::Git(git_dir)
            });
            cmd_review(config, &context, analysis.as_deref(), report_dir, commit).await?
        }
        Commands::Judge { analysis, opinions } => {
            cmd_judge(&config, &analysis, opinions.as_deref())?
        }
        Commands::VerifyReport { dir, decision } => cmd_verify_report(&dir, decision)?,
    };

    METRICS.flush();
    Ok(ExitCode::from(code))
}

fn load_config(path: Option<&Path>) -> Result<GateConfig> {
    match path {
        Some(path) => GateConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(GateConfig::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_context(path: &Path) -> Result<ChangeContext> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ChangeContext::from_json(&raw)
        .with_context(|| format!("Invalid change context in {}", path.display()))
}

fn exit_code(outcome: DecisionOutcome) -> u8 {
    u8::try_from(outcome.exit_code()).unwrap_or(1)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_classify(config: GateConfig, context: &Path) -> Result<u8> {
    let ctx = read_context(context)?;
    let classification = tiergate_core::explain(&config.classifier, &ctx);
    print_json(&json!({
        "tier": classification.tier,
        "rule": classification.rule,
        "reason": classification.describe(&ctx),
    }))?;
    Ok(0)
}

enum CommitMode {
    DryRun,
    Git(PathBuf),
}

async fn cmd_review(
    mut config: GateConfig,
    context: &Path,
    analysis: Option<&Path>,
    report_dir: Option<PathBuf>,
    commit: Option<CommitMode>,
) -> Result<u8> {
    let ctx = read_context(context)?;
    let reports: Vec<AnalysisReport> = match analysis {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    if report_dir.is_some() {
        config.pipeline.report_dir = report_dir;
    }

    let mut builder = GatePipeline::builder(config).notifier(Arc::new(LogNotifier));
    builder = match commit {
        Some(CommitMode::DryRun) => builder.commit_executor(Arc::new(DryRunCommitExecutor)),
        Some(CommitMode::Git(dir)) => {
            builder.commit_executor(Arc::new(GitCommitExecutor::new(dir)))
        }
        None => builder,
    };
    let pipeline = builder.build().context("Failed to build gate pipeline")?;

    let id = pipeline.submit_with_analysis(ctx, reports)?;
    info!(pipeline_id = %id, "review submitted");
    let outcome = pipeline.wait(id).await?;
    let state = pipeline.get_status(id)?;
    pipeline.shutdown().await;

    print_json(&state)?;
    Ok(exit_code(outcome))
}

fn cmd_judge(config: &GateConfig, analysis: &Path, opinions: Option<&Path>) -> Result<u8> {
    let reports: Vec<AnalysisReport> = read_json(analysis)?;
    let opinions: Vec<Opinion> = match opinions {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let adapter = AnalysisResultAdapter::new(config.adapter.clone());
    let engine = QualityJudgmentEngine::new(config.judgment.clone())?;
    let judgment = engine.judge(&adapter.normalize_all(&reports), &opinions)?;

    print_json(&judgment)?;
    Ok(exit_code(judgment.decision.verdict().into()))
}

fn cmd_verify_report(dir: &Path, decision: Uuid) -> Result<u8> {
    let record = read_audit_record(dir, decision)
        .with_context(|| format!("Audit record {decision} failed verification"))?;
    print_json(&json!({
        "verified": true,
        "pipeline_id": record.pipeline_id,
        "decision_id": record.decision.id(),
        "verdict": record.decision.verdict(),
        "recorded_at": record.recorded_at,
    }))?;
    Ok(0)
}
