//! Quality judgment engine.
//!
//! Combines normalized analysis contributions into one weighted 0–100
//! composite, nudges it by consultant consensus, and issues a three-way
//! verdict plus an optional certification level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::JudgmentConfig;
use crate::domain::{
    Decision, Opinion, RejectionReason, ScoreContribution, Tier, Verdict, WeightGroup,
};
use crate::error::{GateError, GateResult};

/// Shape of the consultant vote on the judgment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    UnanimousApprove,
    MajorityApprove,
    Split,
    MajorityReject,
    UnanimousReject,
    NoOpinions,
}

impl Consensus {
    pub fn from_opinions(opinions: &[Opinion]) -> Self {
        let total = opinions.len();
        let approvals = opinions.iter().filter(|o| o.approve).count();
        match (approvals, total) {
            (_, 0) => Self::NoOpinions,
            (a, n) if a == n => Self::UnanimousApprove,
            (0, _) => Self::UnanimousReject,
            (a, n) if a * 2 > n => Self::MajorityApprove,
            (a, n) if a * 2 < n => Self::MajorityReject,
            _ => Self::Split,
        }
    }

    /// Unanimous or simple-majority approval.
    pub fn is_majority_approve(self) -> bool {
        matches!(self, Self::UnanimousApprove | Self::MajorityApprove)
    }

    /// Score multiplier for a given fractional adjustment.
    pub fn multiplier(self, adjustment: f64) -> f64 {
        match self {
            Self::UnanimousApprove => 1.0 + adjustment,
            Self::MajorityReject | Self::UnanimousReject => 1.0 - adjustment,
            Self::MajorityApprove | Self::Split | Self::NoOpinions => 1.0,
        }
    }
}

impl std::fmt::Display for Consensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnanimousApprove => "unanimous approve",
            Self::MajorityApprove => "majority approve",
            Self::Split => "split",
            Self::MajorityReject => "majority reject",
            Self::UnanimousReject => "unanimous reject",
            Self::NoOpinions => "no opinions",
        };
        f.write_str(s)
    }
}

/// Full result of a judgment, including the intermediate scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub decision: Decision,
    /// Weighted composite before the consensus adjustment.
    pub raw_composite: f64,
    /// Composite after adjustment and clamping; the score the verdict uses.
    pub composite: f64,
    pub consensus: Consensus,
    pub group_scores: BTreeMap<WeightGroup, f64>,
}

/// Weighs analysis contributions against consultant consensus.
#[derive(Debug, Clone)]
pub struct QualityJudgmentEngine {
    config: JudgmentConfig,
}

impl QualityJudgmentEngine {
    /// Build an engine; fails if the weights do not sum to 100.
    pub fn new(config: JudgmentConfig) -> GateResult<Self> {
        config.validate()?;
        let mut config = config;
        config
            .certification
            .sort_by(|a, b| b.min_score.total_cmp(&a.min_score));
        Ok(Self { config })
    }

    /// Mean score per weight group; groups without contributions score 0.
    pub fn group_scores(
        &self,
        contributions: &[ScoreContribution],
    ) -> GateResult<BTreeMap<WeightGroup, f64>> {
        let mut buckets: BTreeMap<WeightGroup, Vec<f64>> = BTreeMap::new();
        for c in contributions {
            if !c.score.is_finite() {
                return Err(GateError::System(format!(
                    "contribution from {} has non-finite score",
                    c.source
                )));
            }
            buckets.entry(c.category.weight_group()).or_default().push(c.score);
        }

        let mut scores = BTreeMap::new();
        for group in [WeightGroup::Style, WeightGroup::Tests, WeightGroup::Quality] {
            let mean = match buckets.get_mut(&group) {
                Some(values) if !values.is_empty() => {
                    values.sort_by(f64::total_cmp);
                    values.iter().sum::<f64>() / values.len() as f64
                }
                _ => 0.0,
            };
            scores.insert(group, mean);
        }
        Ok(scores)
    }

    /// Weighted composite in 0–100, before any consensus adjustment.
    pub fn composite(&self, contributions: &[ScoreContribution]) -> GateResult<f64> {
        let groups = self.group_scores(contributions)?;
        Ok(self.weigh(&groups))
    }

    fn weigh(&self, groups: &BTreeMap<WeightGroup, f64>) -> f64 {
        let w = &self.config.weights;
        let score = |g| groups.get(&g).copied().unwrap_or(0.0);
        (w.style * score(WeightGroup::Style)
            + w.tests * score(WeightGroup::Tests)
            + w.quality * score(WeightGroup::Quality))
            / 100.0
    }

    /// Highest certification level whose threshold `score` reaches.
    pub fn certification(&self, score: f64) -> Option<String> {
        self.config
            .certification
            .iter()
            .find(|level| score >= level.min_score)
            .map(|level| level.label.clone())
    }

    /// Judge contributions and council opinions. Deterministic: identical
    /// inputs always yield the identical score and verdict.
    pub fn judge(
        &self,
        contributions: &[ScoreContribution],
        opinions: &[Opinion],
    ) -> GateResult<Judgment> {
        if contributions.is_empty() && opinions.is_empty() {
            return Err(GateError::System(
                "judgment requested with no contributions and no opinions".to_string(),
            ));
        }

        let cfg = &self.config;
        let group_scores = self.group_scores(contributions)?;
        let raw = self.weigh(&group_scores);
        let consensus = Consensus::from_opinions(opinions);
        let composite = (raw * consensus.multiplier(cfg.consensus_adjustment)).clamp(0.0, 100.0);
        if !composite.is_finite() {
            return Err(GateError::System("composite score is not finite".to_string()));
        }

        let incomplete: Vec<&str> = contributions
            .iter()
            .filter(|c| !c.status.is_completed())
            .map(|c| c.source.as_str())
            .collect();

        let approvals = opinions.iter().filter(|o| o.approve).count();
        let mut reasoning = vec![
            format!(
                "composite {raw:.2} -> {composite:.2} after {consensus} consensus"
            ),
            format!("approvals {approvals}/{}", opinions.len()),
            format!(
                "group scores: style {:.2}, tests {:.2}, quality {:.2}",
                group_scores[&WeightGroup::Style],
                group_scores[&WeightGroup::Tests],
                group_scores[&WeightGroup::Quality],
            ),
        ];
        if !incomplete.is_empty() {
            reasoning.push(format!("engines not completed: [{}]", incomplete.join(", ")));
        }

        let (verdict, rejection) = if composite >= cfg.approve_threshold
            && consensus.is_majority_approve()
            && incomplete.is_empty()
        {
            reasoning.push(format!(
                "approved: composite >= {:.0} with majority approval and all engines completed",
                cfg.approve_threshold
            ));
            (Verdict::Approved, None)
        } else if composite >= cfg.conditional_threshold && consensus != Consensus::UnanimousReject
        {
            reasoning.push(format!(
                "conditionally approved: composite >= {:.0}",
                cfg.conditional_threshold
            ));
            (Verdict::ConditionalApproved, None)
        } else if composite >= cfg.conditional_threshold {
            reasoning.push("rejected: consultants unanimously rejected".to_string());
            (Verdict::Rejected, Some(RejectionReason::ConsultantRejected))
        } else {
            reasoning.push(format!(
                "rejected: composite {composite:.2} below {:.0}",
                cfg.conditional_threshold
            ));
            (Verdict::Rejected, Some(RejectionReason::ScoreBelowThreshold))
        };

        let certification = if verdict.is_approval() {
            self.certification(composite)
        } else {
            None
        };
        if let Some(level) = &certification {
            reasoning.push(format!("certification: {level}"));
        }

        let mut decision = Decision::new(
            Tier::Exhaustive,
            verdict,
            reasoning,
            opinions.to_vec(),
            contributions.to_vec(),
        )
        .with_composite(composite)
        .with_certification(certification);
        if let Some(reason) = rejection {
            decision = decision.with_rejection(reason);
        }

        Ok(Judgment {
            decision,
            raw_composite: raw,
            composite,
            consensus,
            group_scores,
        })
    }
}
