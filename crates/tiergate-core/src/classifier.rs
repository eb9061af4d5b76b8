//! Layer classifier: picks a review tier from change metadata.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. emergency urgency, few files, low complexity → [`Tier::Fast`]
//! 2. high urgency, very few files, very low complexity → [`Tier::Fast`]
//! 3. high complexity or many files → [`Tier::Exhaustive`]
//! 4. everything else → [`Tier::Standard`]
//!
//! Rule 3 ignores urgency, so an urgent but large change can never skip the
//! exhaustive review. Urgency only fast-tracks small changes.

use serde::{Deserialize, Serialize};

use crate::config::ClassifierThresholds;
use crate::domain::{ChangeContext, Tier, Urgency};

/// Which classifier rule selected the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationRule {
    EmergencySmall,
    HighUrgencySmall,
    LargeOrComplex,
    Default,
}

/// A tier together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: Tier,
    pub rule: ClassificationRule,
}

impl Classification {
    /// Human-readable reason, used in decision reasoning and logs.
    pub fn describe(&self, ctx: &ChangeContext) -> String {
        let why = match self.rule {
            ClassificationRule::EmergencySmall => "emergency change small enough to fast-track",
            ClassificationRule::HighUrgencySmall => "high-urgency change small enough to fast-track",
            ClassificationRule::LargeOrComplex => "change too large or complex for a lighter tier",
            ClassificationRule::Default => "regular change",
        };
        format!(
            "tier {} ({why}: urgency {}, {} files, complexity {:.2})",
            self.tier,
            ctx.urgency(),
            ctx.file_count(),
            ctx.complexity()
        )
    }
}

/// Classify with default thresholds.
pub fn classify(ctx: &ChangeContext) -> Tier {
    explain(&ClassifierThresholds::default(), ctx).tier
}

/// Classify with explicit thresholds.
pub fn classify_with(thresholds: &ClassifierThresholds, ctx: &ChangeContext) -> Tier {
    explain(thresholds, ctx).tier
}

/// Classify and report the matching rule. Pure and total.
pub fn explain(t: &ClassifierThresholds, ctx: &ChangeContext) -> Classification {
    let files = ctx.file_count();
    let complexity = ctx.complexity();

    let (tier, rule) = match ctx.urgency() {
        Urgency::Emergency
            if files <= t.emergency_max_files && complexity <= t.emergency_max_complexity =>
        {
            (Tier::Fast, ClassificationRule::EmergencySmall)
        }
        Urgency::High if files <= t.high_max_files && complexity <= t.high_max_complexity => {
            (Tier::Fast, ClassificationRule::HighUrgencySmall)
        }
        _ if complexity > t.exhaustive_complexity || files > t.exhaustive_files => {
            (Tier::Exhaustive, ClassificationRule::LargeOrComplex)
        }
        _ => (Tier::Standard, ClassificationRule::Default),
    };

    Classification { tier, rule }
}
