//! Normalized analysis-engine signals.

use serde::{Deserialize, Serialize};

/// What kind of quality signal a contribution carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Style,
    Lint,
    Format,
    Types,
    Tests,
    Coverage,
    Security,
    Complexity,
    Other,
}

/// Weight bucket a category counts towards in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightGroup {
    Style,
    Tests,
    Quality,
}

impl Category {
    pub fn weight_group(self) -> WeightGroup {
        match self {
            Self::Style | Self::Lint | Self::Format => WeightGroup::Style,
            Self::Tests | Self::Coverage => WeightGroup::Tests,
            Self::Types | Self::Security | Self::Complexity | Self::Other => WeightGroup::Quality,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Style => "style",
            Self::Lint => "lint",
            Self::Format => "format",
            Self::Types => "types",
            Self::Tests => "tests",
            Self::Coverage => "coverage",
            Self::Security => "security",
            Self::Complexity => "complexity",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Execution status reported by an analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Completed,
    Partial,
    Failed,
    TimedOut,
    Skipped,
}

impl EngineStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One engine's normalized contribution to the quality score.
///
/// Deserialization clamps the score to 0–100 and rejects non-finite scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ContributionRecord")]
pub struct ScoreContribution {
    /// Engine that produced the signal.
    pub source: String,
    /// Normalized score in 0–100.
    pub score: f64,
    /// Raw number of issues the engine reported.
    pub issue_count: u32,
    pub category: Category,
    pub status: EngineStatus,
}

/// Wire form of a [`ScoreContribution`].
#[derive(Deserialize)]
struct ContributionRecord {
    source: String,
    score: f64,
    #[serde(default)]
    issue_count: u32,
    category: Category,
    #[serde(default = "completed")]
    status: EngineStatus,
}

fn completed() -> EngineStatus {
    EngineStatus::Completed
}

impl TryFrom<ContributionRecord> for ScoreContribution {
    type Error = String;

    fn try_from(r: ContributionRecord) -> Result<Self, Self::Error> {
        if !r.score.is_finite() {
            return Err(format!("score from {} must be finite, got {}", r.source, r.score));
        }
        Ok(Self::new(r.source, r.category, r.score, r.issue_count).with_status(r.status))
    }
}

impl ScoreContribution {
    /// Create a completed contribution; `score` is clamped to 0–100.
    pub fn new(source: impl Into<String>, category: Category, score: f64, issue_count: u32) -> Self {
        Self {
            source: source.into(),
            score: score.clamp(0.0, 100.0),
            issue_count,
            category,
            status: EngineStatus::Completed,
        }
    }

    pub fn with_status(mut self, status: EngineStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_groups() {
        assert_eq!(Category::Lint.weight_group(), WeightGroup::Style);
        assert_eq!(Category::Format.weight_group(), WeightGroup::Style);
        assert_eq!(Category::Coverage.weight_group(), WeightGroup::Tests);
        assert_eq!(Category::Security.weight_group(), WeightGroup::Quality);
        assert_eq!(Category::Types.weight_group(), WeightGroup::Quality);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(ScoreContribution::new("x", Category::Lint, 140.0, 0).score, 100.0);
        assert_eq!(ScoreContribution::new("x", Category::Lint, -3.0, 0).score, 0.0);
    }

    #[test]
    fn test_deserialized_score_is_clamped() {
        let high: ScoreContribution = serde_json::from_str(
            r#"{"source":"clippy","score":250.0,"category":"lint","status":"partial"}"#,
        )
        .unwrap();
        assert_eq!(high.score, 100.0);
        assert_eq!(high.status, EngineStatus::Partial);

        let low: ScoreContribution =
            serde_json::from_str(r#"{"source":"tests","score":-12.5,"category":"tests"}"#).unwrap();
        assert_eq!(low.score, 0.0);
        assert_eq!(low.status, EngineStatus::Completed);
    }
}
