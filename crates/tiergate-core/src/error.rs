//! Error taxonomy for TierGate.
//!
//! Consultant and engine failures are contained by the orchestrator and never
//! surface through these types from `run`. Quorum failures are ordinary
//! rejections (see [`crate::domain::RejectionReason`]), not errors.

use crate::domain::{PipelineId, PipelineStatus};

/// TierGate core errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("consultant {consultant} exceeded its {budget_ms}ms budget")]
    ConsultationTimeout { consultant: String, budget_ms: u64 },

    #[error("consultant {consultant} failed: {reason}")]
    ConsultationFailure { consultant: String, reason: String },

    #[error("pipeline not found: {0}")]
    PipelineNotFound(PipelineId),

    #[error("pipeline {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: PipelineId,
        from: PipelineStatus,
        to: PipelineStatus,
    },

    #[error("invalid change context: {0}")]
    InvalidContext(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("system error: {0}")]
    System(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for TierGate operations.
pub type GateResult<T> = std::result::Result<T, GateError>;
