//! Domain model for TierGate.
//!
//! - `ChangeContext`: the immutable change under review
//! - `Tier`: review strictness level
//! - `Opinion`: one consultant's verdict
//! - `ScoreContribution`: one analysis engine's normalized signal
//! - `Decision`: the immutable gate outcome
//! - `PipelineState`: lifecycle snapshot of one run

pub mod change;
pub mod contribution;
pub mod decision;
pub mod opinion;
pub mod state;
pub mod tier;

pub use change::{ChangeContext, ChangeContextBuilder, ChangeContextSpec, Urgency};
pub use contribution::{Category, EngineStatus, ScoreContribution, WeightGroup};
pub use decision::{Decision, DecisionOutcome, RejectionReason, Verdict};
pub use opinion::Opinion;
pub use state::{PipelineId, PipelineState, PipelineStatus, StageTransition};
pub use tier::Tier;
