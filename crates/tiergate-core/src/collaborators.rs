//! External collaborator boundaries: commit execution, notification, and
//! audit report persistence.
//!
//! The core only calls these after a decision is recorded. Commit execution
//! happens only for approved decisions; notifier and sink failures are
//! logged by the reporting queue and never alter a recorded decision.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ChangeContext, Decision, PipelineId};
use crate::error::{GateError, GateResult};

// ---------------------------------------------------------------------------
// Audit record
// ---------------------------------------------------------------------------

/// A decision plus everything needed to audit it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub pipeline_id: PipelineId,
    pub context: ChangeContext,
    /// Why the classifier picked the tier.
    pub classification: String,
    /// Carries the full opinion and contribution trail.
    pub decision: Decision,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        pipeline_id: PipelineId,
        context: ChangeContext,
        classification: impl Into<String>,
        decision: Decision,
    ) -> Self {
        Self {
            pipeline_id,
            context,
            classification: classification.into(),
            decision,
            recorded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Applies an approved change to version control.
#[async_trait]
pub trait CommitExecutor: Send + Sync {
    /// Returns whether the commit succeeded.
    async fn execute(&self, change: &ChangeContext, bypass_checks: bool) -> anyhow::Result<bool>;
}

/// Best-effort decision notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, decision: &Decision) -> anyhow::Result<()>;
}

/// Write-only persistence of audit records.
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Logs what would be committed without touching the repository.
#[derive(Debug, Clone, Default)]
pub struct DryRunCommitExecutor;

#[async_trait]
impl CommitExecutor for DryRunCommitExecutor {
    async fn execute(&self, change: &ChangeContext, bypass_checks: bool) -> anyhow::Result<bool> {
        info!(
            files = change.file_count(),
            bypass_checks,
            description = %change.description(),
            "dry run: would commit change"
        );
        Ok(true)
    }
}

/// Stages the change's files and commits them with `git`.
#[derive(Debug, Clone)]
pub struct GitCommitExecutor {
    repo_dir: PathBuf,
}

impl GitCommitExecutor {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    async fn git(&self, args: &[&str]) -> anyhow::Result<std::process::Output> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(output)
    }
}

#[async_trait]
impl CommitExecutor for GitCommitExecutor {
    async fn execute(&self, change: &ChangeContext, bypass_checks: bool) -> anyhow::Result<bool> {
        if change.files().is_empty() {
            anyhow::bail!("change has no files to commit");
        }

        let mut add = vec!["add", "--"];
        add.extend(change.files().iter().map(String::as_str));
        let staged = self.git(&add).await?;
        if !staged.status.success() {
            warn!(stderr = %String::from_utf8_lossy(&staged.stderr), "git add failed");
            return Ok(false);
        }

        let message = if change.description().trim().is_empty() {
            "Gate-approved change"
        } else {
            change.description()
        };
        let mut commit = vec!["commit", "-m", message];
        if bypass_checks {
            commit.push("--no-verify");
        }
        let out = self.git(&commit).await?;
        if !out.status.success() {
            warn!(stderr = %String::from_utf8_lossy(&out.stderr), "git commit failed");
        }
        Ok(out.status.success())
    }
}

/// Emits each decision as a structured log line.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, decision: &Decision) -> anyhow::Result<()> {
        info!(
            decision_id = %decision.id(),
            tier = %decision.tier(),
            verdict = %decision.verdict(),
            reasoning = %decision.reasoning().join(" | "),
            "decision notification"
        );
        Ok(())
    }
}

/// Persists `<dir>/<decision_id>/decision.json` and `decision.digest`.
#[derive(Debug, Clone)]
pub struct JsonFileReportSink {
    dir: PathBuf,
}

impl JsonFileReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl ReportSink for JsonFileReportSink {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn write(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let record_dir = self.dir.join(record.decision.id().to_string());
        tokio::fs::create_dir_all(&record_dir).await?;

        let json = serde_json::to_vec_pretty(record)?;
        let digest = sha256_hex(&json);
        tokio::fs::write(record_dir.join("decision.json"), &json).await?;
        tokio::fs::write(record_dir.join("decision.digest"), digest.as_bytes()).await?;
        Ok(())
    }
}

/// Read `<dir>/<decision_id>/decision.json` and verify it against its digest.
pub fn read_audit_record(dir: &Path, decision_id: Uuid) -> GateResult<AuditRecord> {
    let record_dir = dir.join(decision_id.to_string());
    let json = std::fs::read(record_dir.join("decision.json"))?;
    let expected = std::fs::read_to_string(record_dir.join("decision.digest"))?;
    let actual = sha256_hex(&json);
    if expected.trim() != actual {
        return Err(GateError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}
