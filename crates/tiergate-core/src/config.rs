//! Gate configuration.
//!
//! Every threshold below is a tunable default, loaded from TOML with
//! `#[serde(default)]` on each section so a partial file only overrides what
//! it names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::AdapterPenalties;
use crate::error::{GateError, GateResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub classifier: ClassifierThresholds,
    pub orchestration: OrchestrationConfig,
    pub aggregation: AggregationThresholds,
    pub judgment: JudgmentConfig,
    pub consultants: ConsultantConfig,
    pub adapter: AdapterPenalties,
    pub pipeline: PipelineConfig,
}

impl GateConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> GateResult<Self> {
        let config: GateConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> GateResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> GateResult<()> {
        self.classifier.validate()?;
        self.judgment.validate()?;
        let a = &self.aggregation;
        if !(0.0..=1.0).contains(&a.fast_max_risk)
            || !(0.0..=1.0).contains(&a.exhaustive_quorum)
            || !(0.0..=1.0).contains(&a.exhaustive_max_mean_risk)
        {
            return Err(GateError::InvalidConfig(
                "aggregation risk/quorum values must be within 0.0–1.0".to_string(),
            ));
        }
        if self.orchestration.fast_budget_ms == 0 || self.orchestration.standard_timeout_ms == 0 {
            return Err(GateError::InvalidConfig(
                "orchestration budgets must be non-zero".to_string(),
            ));
        }
        if self.pipeline.report_queue_capacity == 0 {
            return Err(GateError::InvalidConfig(
                "report_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pipeline.report_timeout_ms == 0 {
            return Err(GateError::InvalidConfig(
                "report_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Layer classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    pub emergency_max_files: usize,
    pub emergency_max_complexity: f64,
    pub high_max_files: usize,
    pub high_max_complexity: f64,
    /// Complexity strictly above this forces the exhaustive tier.
    pub exhaustive_complexity: f64,
    /// File count strictly above this forces the exhaustive tier.
    pub exhaustive_files: usize,
}

impl ClassifierThresholds {
    /// Fast-track limits must sit inside the exhaustive limits.
    pub fn validate(&self) -> GateResult<()> {
        let complexities = [
            ("emergency_max_complexity", self.emergency_max_complexity),
            ("high_max_complexity", self.high_max_complexity),
        ];
        for (name, value) in complexities {
            if !value.is_finite() || value > self.exhaustive_complexity {
                return Err(GateError::InvalidConfig(format!(
                    "classifier.{name} ({value}) must not exceed exhaustive_complexity ({})",
                    self.exhaustive_complexity
                )));
            }
        }
        let file_limits = [
            ("emergency_max_files", self.emergency_max_files),
            ("high_max_files", self.high_max_files),
        ];
        for (name, value) in file_limits {
            if value > self.exhaustive_files {
                return Err(GateError::InvalidConfig(format!(
                    "classifier.{name} ({value}) must not exceed exhaustive_files ({})",
                    self.exhaustive_files
                )));
            }
        }
        Ok(())
    }
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            emergency_max_files: 5,
            emergency_max_complexity: 0.5,
            high_max_files: 3,
            high_max_complexity: 0.3,
            exhaustive_complexity: 0.8,
            exhaustive_files: 20,
        }
    }
}

/// Time budgets and retry policy for consultations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Hard budget for the single fast-tier consultation.
    pub fast_budget_ms: u64,
    /// Overall timeout for the standard-tier fan-out.
    pub standard_timeout_ms: u64,
    /// How long an aborted consultation may take to wind down before it is
    /// reported as ignoring cancellation.
    pub cancellation_grace_ms: u64,
    /// Extra attempts for a failed exhaustive-tier consultant.
    pub exhaustive_retries: u32,
    /// Opinions with risk strictly above this get a deep-analysis round.
    pub deep_analysis_risk: f64,
    /// Per-engine budget for analysis engines run by the pipeline.
    pub engine_timeout_ms: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            fast_budget_ms: 1_500,
            standard_timeout_ms: 30_000,
            cancellation_grace_ms: 250,
            exhaustive_retries: 1,
            deep_analysis_risk: 0.7,
            engine_timeout_ms: 300_000,
        }
    }
}

impl OrchestrationConfig {
    pub fn fast_budget(&self) -> Duration {
        Duration::from_millis(self.fast_budget_ms)
    }

    pub fn standard_timeout(&self) -> Duration {
        Duration::from_millis(self.standard_timeout_ms)
    }

    pub fn cancellation_grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}

/// Voting thresholds for the decision aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationThresholds {
    /// Fast-tier risk must be strictly below this.
    pub fast_max_risk: f64,
    /// Absolute floor on exhaustive-tier approvals.
    pub exhaustive_min_approvals: usize,
    /// Fraction of opinions that must approve on the exhaustive tier.
    pub exhaustive_quorum: f64,
    /// Mean exhaustive-tier risk must not exceed this.
    pub exhaustive_max_mean_risk: f64,
}

impl Default for AggregationThresholds {
    fn default() -> Self {
        Self {
            fast_max_risk: 0.9,
            exhaustive_min_approvals: 3,
            exhaustive_quorum: 0.75,
            exhaustive_max_mean_risk: 0.6,
        }
    }
}

/// Category-group weights for the composite score, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentWeights {
    pub style: f64,
    pub tests: f64,
    pub quality: f64,
}

impl Default for JudgmentWeights {
    fn default() -> Self {
        Self {
            style: 35.0,
            tests: 35.0,
            quality: 30.0,
        }
    }
}

/// One row of the certification table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationLevel {
    pub min_score: f64,
    pub label: String,
}

/// Quality judgment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentConfig {
    pub weights: JudgmentWeights,
    /// Fractional bonus/penalty applied for consultant consensus.
    pub consensus_adjustment: f64,
    pub approve_threshold: f64,
    pub conditional_threshold: f64,
    /// Evaluated highest `min_score` first.
    pub certification: Vec<CertificationLevel>,
}

impl Default for JudgmentConfig {
    fn default() -> Self {
        Self {
            weights: JudgmentWeights::default(),
            consensus_adjustment: 0.05,
            approve_threshold: 95.0,
            conditional_threshold: 85.0,
            certification: vec![
                CertificationLevel {
                    min_score: 99.0,
                    label: "distinguished".to_string(),
                },
                CertificationLevel {
                    min_score: 95.0,
                    label: "certified".to_string(),
                },
            ],
        }
    }
}

impl JudgmentConfig {
    pub fn validate(&self) -> GateResult<()> {
        let w = &self.weights;
        let total = w.style + w.tests + w.quality;
        if [w.style, w.tests, w.quality].iter().any(|v| !v.is_finite() || *v < 0.0)
            || (total - 100.0).abs() > 1e-6
        {
            return Err(GateError::InvalidConfig(format!(
                "judgment weights must be non-negative and sum to 100, got {total}"
            )));
        }
        if !(0.0..1.0).contains(&self.consensus_adjustment) {
            return Err(GateError::InvalidConfig(
                "consensus_adjustment must be within 0.0–1.0".to_string(),
            ));
        }
        if self.conditional_threshold > self.approve_threshold {
            return Err(GateError::InvalidConfig(
                "conditional_threshold must not exceed approve_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the built-in heuristic consultants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultantConfig {
    /// Paths whose modification raises risk.
    pub sensitive_paths: Vec<String>,
    /// Paths a change must never touch.
    pub forbidden_paths: Vec<String>,
    /// Metadata keys every change must carry.
    pub required_metadata: Vec<String>,
    /// Risk at or above which the risk consultant rejects.
    pub reject_risk: f64,
    /// Top-level directories a change may span before the scope consultant objects.
    pub max_top_level_dirs: usize,
}

impl Default for ConsultantConfig {
    fn default() -> Self {
        Self {
            sensitive_paths: vec![
                r"(^|/)migrations?/".to_string(),
                r"(^|/)(auth|security|crypto)/".to_string(),
                r"(^|/)Cargo\.lock$".to_string(),
                r"\.github/workflows/".to_string(),
            ],
            forbidden_paths: vec![r"(^|/)\.env$".to_string(), r"\.pem$".to_string()],
            required_metadata: Vec::new(),
            reject_risk: 0.7,
            max_top_level_dirs: 4,
        }
    }
}

/// Pipeline service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Also run the commit executor on conditional approvals.
    pub commit_on_conditional: bool,
    pub report_queue_capacity: usize,
    /// Budget for each notifier or sink call made by the report worker.
    pub report_timeout_ms: u64,
    /// Directory for JSON audit records; none disables the file sink.
    pub report_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_on_conditional: false,
            report_queue_capacity: 64,
            report_timeout_ms: 10_000,
            report_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }
}
