//! Pipeline lifecycle records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{Decision, DecisionOutcome};
use super::tier::Tier;

/// Identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipelineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a pipeline run.
///
/// Transitions only move forward: `Running → {Completed, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        matches!(self, Self::Running) && next.is_terminal()
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry of a pipeline's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub stage: String,
    pub status: PipelineStatus,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Snapshot of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub id: PipelineId,
    pub tier: Tier,
    pub status: PipelineStatus,
    /// Name of the stage currently (or last) executing.
    pub stage: String,
    pub decision: Option<Decision>,
    /// Failure or cancellation reason.
    pub error: Option<String>,
    pub history: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    /// Caller-facing outcome for this state, `None` while still running.
    pub fn outcome(&self) -> Option<DecisionOutcome> {
        match self.status {
            PipelineStatus::Running => None,
            PipelineStatus::Cancelled => Some(DecisionOutcome::Cancelled),
            PipelineStatus::Failed => Some(DecisionOutcome::Error),
            PipelineStatus::Completed => Some(
                self.decision
                    .as_ref()
                    .map(|d| DecisionOutcome::from(d.verdict()))
                    .unwrap_or(DecisionOutcome::Error),
            ),
        }
    }
}
