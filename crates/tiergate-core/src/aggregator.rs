//! Decision aggregator.
//!
//! Applies the tier's voting rule to a set of consultant opinions and
//! produces a [`Decision`]. Pure and commutative: the order of `opinions`
//! never affects the verdict.
//!
//! | Tier       | Approves when                                                    |
//! |------------|------------------------------------------------------------------|
//! | Fast       | every opinion approves and every risk `<` `fast_max_risk`        |
//! | Standard   | approvals × 2 `>` N                                              |
//! | Exhaustive | approvals `>=` max(min, ⌈quorum × N⌉) and mean risk `<=` ceiling |

use crate::config::AggregationThresholds;
use crate::domain::{Decision, Opinion, RejectionReason, Tier, Verdict};

/// Turns opinions into decisions.
#[derive(Debug, Clone, Default)]
pub struct DecisionAggregator {
    thresholds: AggregationThresholds,
}

impl DecisionAggregator {
    pub fn new(thresholds: AggregationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn decide(&self, tier: Tier, opinions: &[Opinion]) -> Decision {
        let total = opinions.len();
        let approvals = opinions.iter().filter(|o| o.approve).count();
        let mut reasoning = vec![format!("tier {tier}: approvals {approvals}/{total}")];

        if total == 0 {
            reasoning.push("rejected: no consultants available".to_string());
            return Decision::new(tier, Verdict::Rejected, reasoning, Vec::new(), Vec::new())
                .with_rejection(RejectionReason::NoConsultantsAvailable);
        }

        let rejection = match tier {
            Tier::Fast => self.check_fast(opinions, &mut reasoning),
            Tier::Standard => check_standard(approvals, total, &mut reasoning),
            Tier::Exhaustive => self.check_exhaustive(opinions, approvals, &mut reasoning),
        };

        let opinions = opinions.to_vec();
        match rejection {
            None => Decision::new(tier, Verdict::Approved, reasoning, opinions, Vec::new()),
            Some(reason) => Decision::new(tier, Verdict::Rejected, reasoning, opinions, Vec::new())
                .with_rejection(reason),
        }
    }

    fn check_fast(&self, opinions: &[Opinion], reasoning: &mut Vec<String>) -> Option<RejectionReason> {
        let ceiling = self.thresholds.fast_max_risk;
        let max_risk = opinions.iter().map(|o| o.risk).fold(0.0_f64, f64::max);
        reasoning.push(format!("max risk {max_risk:.2} (must be < {ceiling:.2})"));

        if let Some(o) = opinions
            .iter()
            .filter(|o| !o.approve)
            .min_by(|a, b| a.consultant.cmp(&b.consultant))
        {
            reasoning.push(format!(
                "rejected: consultant {} rejected the change: {}",
                o.consultant, o.advice
            ));
            return Some(RejectionReason::ConsultantRejected);
        }
        if max_risk >= ceiling {
            reasoning.push(format!(
                "rejected: risk threshold exceeded ({max_risk:.2} >= {ceiling:.2})"
            ));
            return Some(RejectionReason::RiskThresholdExceeded);
        }
        None
    }

    fn check_exhaustive(
        &self,
        opinions: &[Opinion],
        approvals: usize,
        reasoning: &mut Vec<String>,
    ) -> Option<RejectionReason> {
        let t = &self.thresholds;
        let total = opinions.len();
        let required = required_approvals(total, t.exhaustive_quorum, t.exhaustive_min_approvals);
        // Sum in sorted order so the mean is bit-identical for any input order.
        let mut risks: Vec<f64> = opinions.iter().map(|o| o.risk).collect();
        risks.sort_by(f64::total_cmp);
        let mean_risk = risks.iter().sum::<f64>() / total as f64;
        reasoning.push(format!(
            "required approvals {required}, mean risk {mean_risk:.2} (ceiling {:.2})",
            t.exhaustive_max_mean_risk
        ));

        let quorum_met = approvals >= required;
        let risk_ok = mean_risk <= t.exhaustive_max_mean_risk;

        if !risk_ok {
            reasoning.push(format!(
                "rejected: risk threshold exceeded (mean {mean_risk:.2} > {:.2})",
                t.exhaustive_max_mean_risk
            ));
        }
        if !quorum_met {
            reasoning.push(format!(
                "rejected: quorum not met ({approvals} < {required})"
            ));
        }

        // Risk outranks quorum: a risky change is rejected regardless of votes.
        match (quorum_met, risk_ok) {
            (_, false) => Some(RejectionReason::RiskThresholdExceeded),
            (false, true) => Some(RejectionReason::QuorumNotMet),
            (true, true) => None,
        }
    }
}

fn check_standard(approvals: usize, total: usize, reasoning: &mut Vec<String>) -> Option<RejectionReason> {
    if approvals * 2 > total {
        reasoning.push("majority approved".to_string());
        None
    } else {
        reasoning.push(format!(
            "rejected: quorum not met (need more than {total}/2 approvals, got {approvals})"
        ));
        Some(RejectionReason::QuorumNotMet)
    }
}

/// `max(floor, ceil(quorum * total))`, computed without float drift for
/// exact fractions such as 0.75 × 4.
pub fn required_approvals(total: usize, quorum: f64, floor: usize) -> usize {
    let raw = quorum * total as f64;
    let rounded = raw.round();
    let by_quorum = if (raw - rounded).abs() < 1e-9 {
        rounded as usize
    } else {
        raw.ceil() as usize
    };
    by_quorum.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn op(id: &str, approve: bool, risk: f64) -> Opinion {
        Opinion::new(id, approve, "advice", risk, Utc::now())
    }

    fn agg() -> DecisionAggregator {
        DecisionAggregator::default()
    }

    #[test]
    fn test_fast_approves_below_risk_margin() {
        let d = agg().decide(Tier::Fast, &[op("risk", true, 0.89)]);
        assert_eq!(d.verdict(), Verdict::Approved);
    }

    #[test]
    fn test_fast_risk_margin_is_strict() {
        let d = agg().decide(Tier::Fast, &[op("risk", true, 0.9)]);
        assert_eq!(d.verdict(), Verdict::Rejected);
        assert_eq!(d.rejection(), Some(RejectionReason::RiskThresholdExceeded));
    }

    #[test]
    fn test_fast_reject_opinion_rejects() {
        let d = agg().decide(Tier::Fast, &[op("risk", false, 0.1)]);
        assert!(!d.approved());
        assert_eq!(d.rejection(), Some(RejectionReason::ConsultantRejected));
    }

    #[test]
    fn test_standard_majority() {
        let d = agg().decide(
            Tier::Standard,
            &[op("a", true, 0.1), op("b", true, 0.2), op("c", false, 0.1)],
        );
        assert!(d.approved());
        assert!(d.reasoning()[0].contains("2/3"));
    }

    #[test]
    fn test_standard_exact_half_rejects() {
        let d = agg().decide(
            Tier::Standard,
            &[op("a", true, 0.1), op("b", false, 0.1)],
        );
        assert!(!d.approved());
        assert_eq!(d.rejection(), Some(RejectionReason::QuorumNotMet));
    }

    #[test]
    fn test_empty_opinions_reject_as_unavailable() {
        for tier in [Tier::Fast, Tier::Standard, Tier::Exhaustive] {
            let d = agg().decide(tier, &[]);
            assert!(!d.approved());
            assert_eq!(d.rejection(), Some(RejectionReason::NoConsultantsAvailable));
            assert!(d.reasoning().iter().any(|r| r.contains("no consultants available")));
        }
    }

    #[test]
    fn test_exhaustive_needs_at_least_three() {
        let d = agg().decide(
            Tier::Exhaustive,
            &[op("a", true, 0.1), op("b", true, 0.1)],
        );
        assert_eq!(d.rejection(), Some(RejectionReason::QuorumNotMet));
    }

    #[test]
    fn test_exhaustive_quorum_boundary_passes() {
        // 4 opinions: ceil(0.75 * 4) = 3, max(3, 3) = 3.
        let d = agg().decide(
            Tier::Exhaustive,
            &[
                op("a", true, 0.1),
                op("b", true, 0.1),
                op("c", true, 0.1),
                op("d", false, 0.1),
            ],
        );
        assert!(d.approved());
    }

    #[test]
    fn test_exhaustive_mean_risk_at_ceiling_passes_above_rejects() {
        let at = [op("a", true, 0.6), op("b", true, 0.6), op("c", true, 0.6)];
        assert!(agg().decide(Tier::Exhaustive, &at).approved());

        let above = [op("a", true, 0.7), op("b", true, 0.6), op("c", true, 0.6)];
        let d = agg().decide(Tier::Exhaustive, &above);
        assert_eq!(d.rejection(), Some(RejectionReason::RiskThresholdExceeded));
    }

    #[test]
    fn test_order_independence() {
        let mut ops = vec![
            op("a", true, 0.3),
            op("b", false, 0.8),
            op("c", true, 0.2),
            op("d", true, 0.5),
            op("e", false, 0.1),
        ];
        for tier in [Tier::Fast, Tier::Standard, Tier::Exhaustive] {
            let first = agg().decide(tier, &ops);
            ops.reverse();
            let second = agg().decide(tier, &ops);
            assert_eq!(first.verdict(), second.verdict());
            assert_eq!(first.rejection(), second.rejection());
        }
    }

    #[test]
    fn test_required_approvals() {
        assert_eq!(required_approvals(4, 0.75, 3), 3);
        assert_eq!(required_approvals(5, 0.75, 3), 4);
        assert_eq!(required_approvals(8, 0.75, 3), 6);
        assert_eq!(required_approvals(2, 0.75, 3), 3);
    }
}
