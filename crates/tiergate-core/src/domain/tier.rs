//! Review tiers.

use serde::{Deserialize, Serialize};

/// Review tier assigned to a change.
///
/// Ordered by strictness; a tier never changes once a pipeline run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Single risk check under a hard wall-clock budget.
    #[serde(alias = "lightning")]
    Fast,
    /// Parallel vote of the full consultant set under a bounded timeout.
    #[serde(alias = "council")]
    Standard,
    /// Unbounded multi-stage review with deep analysis of risky opinions.
    #[serde(alias = "grand")]
    Exhaustive,
}

impl Tier {
    /// Whether every registered consultant takes part at this tier.
    pub fn uses_full_council(self) -> bool {
        !matches!(self, Self::Fast)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Standard => write!(f, "standard"),
            Self::Exhaustive => write!(f, "exhaustive"),
        }
    }
}
