//! Analysis result adapter.
//!
//! External analysis engines (formatter, linter, type checker, test runner,
//! coverage, security scanner) report in their own shapes. The adapter maps
//! each [`AnalysisReport`] onto a 0–100 [`ScoreContribution`] the judgment
//! engine can weigh.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Category, ChangeContext, EngineStatus, ScoreContribution};

// ---------------------------------------------------------------------------
// Engine boundary
// ---------------------------------------------------------------------------

/// What an engine is asked to analyse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTarget {
    pub root: PathBuf,
    pub files: Vec<String>,
}

impl AnalysisTarget {
    pub fn for_change(root: impl Into<PathBuf>, ctx: &ChangeContext) -> Self {
        Self {
            root: root.into(),
            files: ctx.files().iter().cloned().collect(),
        }
    }
}

/// An external static-analysis or test-execution tool.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, target: &AnalysisTarget) -> anyhow::Result<AnalysisReport>;
}

/// Raw engine output, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub engine: String,
    pub status: EngineStatus,
    pub payload: AnalysisPayload,
}

/// Engine-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisPayload {
    Lint {
        errors: u32,
        warnings: u32,
        files_checked: u32,
    },
    Format {
        files_unformatted: u32,
        files_checked: u32,
    },
    TypeCheck {
        errors: u32,
    },
    Tests {
        passed: u32,
        failed: u32,
        skipped: u32,
    },
    Coverage {
        line_percent: f64,
    },
    Security {
        critical: u32,
        high: u32,
        medium: u32,
        low: u32,
    },
    /// Engine already produced a normalized score.
    Score {
        category: Category,
        score: f64,
        issues: u32,
    },
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Points deducted per issue, by engine kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterPenalties {
    pub lint_error: f64,
    pub lint_warning: f64,
    pub type_error: f64,
    pub security_critical: f64,
    pub security_high: f64,
    pub security_medium: f64,
    pub security_low: f64,
}

impl Default for AdapterPenalties {
    fn default() -> Self {
        Self {
            lint_error: 5.0,
            lint_warning: 1.0,
            type_error: 10.0,
            security_critical: 40.0,
            security_high: 20.0,
            security_medium: 5.0,
            security_low: 1.0,
        }
    }
}

/// Converts [`AnalysisReport`]s into [`ScoreContribution`]s.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResultAdapter {
    penalties: AdapterPenalties,
}

impl AnalysisResultAdapter {
    pub fn new(penalties: AdapterPenalties) -> Self {
        Self { penalties }
    }

    pub fn normalize(&self, report: &AnalysisReport) -> ScoreContribution {
        let p = &self.penalties;
        let (category, score, issues) = match &report.payload {
            AnalysisPayload::Lint {
                errors, warnings, ..
            } => (
                Category::Lint,
                100.0 - *errors as f64 * p.lint_error - *warnings as f64 * p.lint_warning,
                errors + warnings,
            ),
            AnalysisPayload::Format {
                files_unformatted,
                files_checked,
            } => {
                let score = if *files_checked == 0 {
                    100.0
                } else {
                    100.0 * (1.0 - *files_unformatted as f64 / *files_checked as f64)
                };
                (Category::Format, score, *files_unformatted)
            }
            AnalysisPayload::TypeCheck { errors } => {
                (Category::Types, 100.0 - *errors as f64 * p.type_error, *errors)
            }
            AnalysisPayload::Tests { passed, failed, .. } => {
                let ran = passed + failed;
                // No executed tests is no evidence, not a pass.
                let score = if ran == 0 {
                    0.0
                } else {
                    100.0 * *passed as f64 / ran as f64
                };
                (Category::Tests, score, *failed)
            }
            AnalysisPayload::Coverage { line_percent } => (Category::Coverage, *line_percent, 0),
            AnalysisPayload::Security {
                critical,
                high,
                medium,
                low,
            } => (
                Category::Security,
                100.0
                    - *critical as f64 * p.security_critical
                    - *high as f64 * p.security_high
                    - *medium as f64 * p.security_medium
                    - *low as f64 * p.security_low,
                critical + high + medium + low,
            ),
            AnalysisPayload::Score {
                category,
                score,
                issues,
            } => (*category, *score, *issues),
        };

        ScoreContribution::new(report.engine.clone(), category, score, issues)
            .with_status(report.status)
    }

    pub fn normalize_all(&self, reports: &[AnalysisReport]) -> Vec<ScoreContribution> {
        reports.iter().map(|r| self.normalize(r)).collect()
    }
}
