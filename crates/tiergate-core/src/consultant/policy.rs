//! Policy compliance checks.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;

use super::{compile_patterns, Consultant, ConsultantFocus};
use crate::config::ConsultantConfig;
use crate::domain::{ChangeContext, Opinion};
use crate::error::GateResult;

/// Rejects changes touching forbidden paths, missing required metadata, or
/// lacking a description.
#[derive(Debug, Clone)]
pub struct PolicyComplianceConsultant {
    forbidden: Vec<Regex>,
    required_metadata: Vec<String>,
}

impl PolicyComplianceConsultant {
    pub const ID: &'static str = "policy-compliance";

    pub fn new(config: &ConsultantConfig) -> GateResult<Self> {
        Ok(Self {
            forbidden: compile_patterns(&config.forbidden_paths)?,
            required_metadata: config.required_metadata.clone(),
        })
    }
}

#[async_trait]
impl Consultant for PolicyComplianceConsultant {
    fn id(&self) -> &str {
        Self::ID
    }

    fn focus(&self) -> ConsultantFocus {
        ConsultantFocus::Policy
    }

    async fn consult(&self, ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        let mut violations = Vec::new();
        let mut risk: f64 = 0.1;

        let forbidden: Vec<&str> = ctx
            .files()
            .iter()
            .filter(|f| self.forbidden.iter().any(|re| re.is_match(f)))
            .map(String::as_str)
            .collect();
        if !forbidden.is_empty() {
            violations.push(format!("forbidden paths: [{}]", forbidden.join(", ")));
            risk = 1.0;
        }

        let missing: Vec<&str> = self
            .required_metadata
            .iter()
            .filter(|k| !ctx.metadata().contains_key(k.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            violations.push(format!("missing metadata: [{}]", missing.join(", ")));
            risk = risk.max(0.6);
        }

        if ctx.description().trim().is_empty() {
            violations.push("change has no description".to_string());
            risk = risk.max(0.4);
        }

        let approve = violations.is_empty();
        let advice = if approve {
            "complies with change policy".to_string()
        } else {
            violations.join("; ")
        };
        Ok(Opinion::new(Self::ID, approve, advice, risk, Utc::now()))
    }
}
