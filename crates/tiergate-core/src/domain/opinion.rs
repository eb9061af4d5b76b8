//! Consultant opinions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One consultant's verdict on one change.
///
/// Deserialized opinions go through [`Opinion::new`], so risk is clamped on
/// the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OpinionRecord")]
pub struct Opinion {
    /// Identifier of the consultant that produced this opinion.
    pub consultant: String,
    /// Whether the consultant approves the change.
    pub approve: bool,
    /// Free-text advice.
    pub advice: String,
    /// Risk score in 0.0–1.0.
    pub risk: f64,
    /// When the opinion was issued.
    pub issued_at: DateTime<Utc>,
}

/// Wire form of an [`Opinion`].
#[derive(Deserialize)]
struct OpinionRecord {
    consultant: String,
    approve: bool,
    #[serde(default)]
    advice: String,
    risk: f64,
    issued_at: DateTime<Utc>,
}

impl From<OpinionRecord> for Opinion {
    fn from(r: OpinionRecord) -> Self {
        Self::new(r.consultant, r.approve, r.advice, r.risk, r.issued_at)
    }
}

impl Opinion {
    /// Create an opinion. `risk` is clamped to 0.0–1.0; NaN becomes 1.0.
    pub fn new(
        consultant: impl Into<String>,
        approve: bool,
        advice: impl Into<String>,
        risk: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let risk = if risk.is_nan() { 1.0 } else { risk.clamp(0.0, 1.0) };
        Self {
            consultant: consultant.into(),
            approve,
            advice: advice.into(),
            risk,
            issued_at: now,
        }
    }

    /// A fail-closed rejection standing in for a consultant that could not answer.
    pub fn fail_closed(consultant: impl Into<String>, advice: impl Into<String>) -> Self {
        Self::new(consultant, false, advice, 1.0, Utc::now())
    }
}
