//! Decisions and caller-facing outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contribution::ScoreContribution;
use super::opinion::Opinion;
use super::tier::Tier;

/// Three-way verdict carried by a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    ConditionalApproved,
    Rejected,
}

impl Verdict {
    /// Whether the change may proceed (possibly with conditions).
    pub fn is_approval(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::ConditionalApproved => write!(f, "conditional_approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// The rule that caused a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Not enough approving opinions.
    QuorumNotMet,
    /// Risk (single or mean) above the tier's ceiling.
    RiskThresholdExceeded,
    /// No opinion came back at all.
    NoConsultantsAvailable,
    /// The designated consultant rejected (fast tier).
    ConsultantRejected,
    /// Composite quality score below the conditional bar.
    ScoreBelowThreshold,
}

/// An immutable gate decision.
///
/// Re-review issues a new `Decision`; there are no mutators. Fields are
/// crate-private so every instance comes from the aggregator or the
/// judgment engine (or deserialization of one they produced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub(crate) id: Uuid,
    pub(crate) tier: Tier,
    pub(crate) verdict: Verdict,
    pub(crate) approved: bool,
    pub(crate) reasoning: Vec<String>,
    pub(crate) opinions: Vec<Opinion>,
    pub(crate) contributions: Vec<ScoreContribution>,
    pub(crate) composite_score: Option<f64>,
    pub(crate) certification: Option<String>,
    pub(crate) rejection: Option<RejectionReason>,
    pub(crate) issued_at: DateTime<Utc>,
}

impl Decision {
    pub(crate) fn new(
        tier: Tier,
        verdict: Verdict,
        reasoning: Vec<String>,
        opinions: Vec<Opinion>,
        contributions: Vec<ScoreContribution>,
    ) -> Self {
        debug_assert!(!reasoning.is_empty(), "decision reasoning must not be empty");
        Self {
            id: Uuid::new_v4(),
            tier,
            verdict,
            approved: verdict.is_approval(),
            reasoning,
            opinions,
            contributions,
            composite_score: None,
            certification: None,
            rejection: None,
            issued_at: Utc::now(),
        }
    }

    pub(crate) fn with_rejection(mut self, reason: RejectionReason) -> Self {
        self.rejection = Some(reason);
        self
    }

    pub(crate) fn with_composite(mut self, score: f64) -> Self {
        self.composite_score = Some(score);
        self
    }

    pub(crate) fn with_certification(mut self, level: Option<String>) -> Self {
        self.certification = level;
        self
    }

    /// Put the tier-selection reason ahead of the verdict reasoning.
    pub(crate) fn with_classification(mut self, reason: String) -> Self {
        self.reasoning.insert(0, reason);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// True for both full and conditional approval.
    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn reasoning(&self) -> &[String] {
        &self.reasoning
    }

    pub fn opinions(&self) -> &[Opinion] {
        &self.opinions
    }

    pub fn contributions(&self) -> &[ScoreContribution] {
        &self.contributions
    }

    pub fn composite_score(&self) -> Option<f64> {
        self.composite_score
    }

    pub fn certification(&self) -> Option<&str> {
        self.certification.as_deref()
    }

    pub fn rejection(&self) -> Option<RejectionReason> {
        self.rejection
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Whether the decision rests on at least one opinion or contribution.
    pub fn has_inputs(&self) -> bool {
        !self.opinions.is_empty() || !self.contributions.is_empty()
    }
}

/// Result reported to callers at the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    ConditionalApproved,
    Rejected,
    Cancelled,
    Error,
}

impl DecisionOutcome {
    /// Process exit code used by the CLI.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Approved => 0,
            Self::Error => 1,
            Self::ConditionalApproved => 2,
            Self::Rejected => 3,
            Self::Cancelled => 4,
        }
    }
}

impl From<Verdict> for DecisionOutcome {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Approved => Self::Approved,
            Verdict::ConditionalApproved => Self::ConditionalApproved,
            Verdict::Rejected => Self::Rejected,
        }
    }
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::ConditionalApproved => write!(f, "conditional_approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error => write!(f, "error"),
        }
    }
}
