//! Heuristic risk analysis.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use super::{compile_patterns, Consultant, ConsultantFocus};
use crate::config::ConsultantConfig;
use crate::domain::{ChangeContext, Opinion};
use crate::error::GateResult;

/// Scores risk from complexity, size, and sensitive paths.
///
/// First pass: `0.5 * complexity + 0.25 * size + 0.25 * sensitive`, where
/// size saturates at 20 files and sensitive saturates at 3 matching files.
/// The deep pass replaces the saturating sensitive term with the share of the
/// change that is sensitive and names each sensitive file.
#[derive(Debug, Clone)]
pub struct RiskAnalysisConsultant {
    sensitive: Vec<Regex>,
    reject_risk: f64,
}

impl RiskAnalysisConsultant {
    pub const ID: &'static str = "risk-analysis";

    pub fn new(config: &ConsultantConfig) -> GateResult<Self> {
        Ok(Self {
            sensitive: compile_patterns(&config.sensitive_paths)?,
            reject_risk: config.reject_risk,
        })
    }

    fn sensitive_files<'a>(&self, ctx: &'a ChangeContext) -> Vec<&'a str> {
        ctx.files()
            .iter()
            .filter(|f| self.sensitive.iter().any(|re| re.is_match(f)))
            .map(String::as_str)
            .collect()
    }

    fn opinion(&self, risk: f64, mut advice: Vec<String>) -> Opinion {
        let approve = risk < self.reject_risk;
        advice.insert(
            0,
            format!(
                "risk {risk:.2} {} threshold {:.2}",
                if approve { "below" } else { "at or above" },
                self.reject_risk
            ),
        );
        Opinion::new(Self::ID, approve, advice.join("; "), risk, Utc::now())
    }
}

#[async_trait]
impl Consultant for RiskAnalysisConsultant {
    fn id(&self) -> &str {
        Self::ID
    }

    fn focus(&self) -> ConsultantFocus {
        ConsultantFocus::Risk
    }

    async fn consult(&self, ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        let sensitive = self.sensitive_files(ctx);
        let size = (ctx.file_count() as f64 / 20.0).min(1.0);
        let sens = (sensitive.len() as f64 / 3.0).min(1.0);
        let risk = 0.5 * ctx.complexity() + 0.25 * size + 0.25 * sens;

        let mut advice = Vec::new();
        if !sensitive.is_empty() {
            advice.push(format!("{} sensitive file(s) touched", sensitive.len()));
        }
        Ok(self.opinion(risk, advice))
    }

    async fn deep_consult(&self, ctx: &ChangeContext, _first: &Opinion) -> anyhow::Result<Opinion> {
        let sensitive = self.sensitive_files(ctx);
        let total = ctx.file_count().max(1) as f64;
        let size = (ctx.file_count() as f64 / 20.0).min(1.0);
        let share = sensitive.len() as f64 / total;
        let risk = 0.5 * ctx.complexity() + 0.2 * size + 0.3 * share;

        let advice = sensitive
            .iter()
            .map(|f| format!("review {f} by hand"))
            .collect();
        Ok(self.opinion(risk, advice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Urgency;

    fn consultant() -> RiskAnalysisConsultant {
        RiskAnalysisConsultant::new(&ConsultantConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_small_simple_change_approved() {
        let ctx = ChangeContext::builder(Urgency::Normal)
            .files(["src/lib.rs"])
            .complexity(0.1)
            .build()
            .unwrap();
        let o = consultant().consult(&ctx).await.unwrap();
        assert!(o.approve);
        assert!(o.risk < 0.2);
        assert_eq!(o.consultant, "risk-analysis");
    }

    #[tokio::test]
    async fn test_sensitive_complex_change_rejected() {
        let ctx = ChangeContext::builder(Urgency::Normal)
            .files([
                "db/migrations/001.sql",
                "src/auth/token.rs",
                "Cargo.lock",
                "src/lib.rs",
            ])
            .complexity(0.9)
            .build()
            .unwrap();
        let o = consultant().consult(&ctx).await.unwrap();
        assert!(!o.approve);
        assert!(o.risk >= 0.7);
        assert!(o.advice.contains("3 sensitive"));
    }

    #[tokio::test]
    async fn test_deep_pass_names_sensitive_files() {
        let ctx = ChangeContext::builder(Urgency::Normal)
            .files(["src/auth/token.rs", "src/lib.rs"])
            .complexity(0.5)
            .build()
            .unwrap();
        let c = consultant();
        let first = c.consult(&ctx).await.unwrap();
        let deep = c.deep_consult(&ctx, &first).await.unwrap();
        assert!(deep.advice.contains("src/auth/token.rs"));
    }
}
