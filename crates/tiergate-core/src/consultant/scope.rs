//! Blast-radius check.

use async_trait::async_trait;
use chrono::Utc;

use super::{Consultant, ConsultantFocus};
use crate::domain::{ChangeContext, Opinion};

/// Objects to changes spread over too many top-level directories.
#[derive(Debug, Clone)]
pub struct ScopeConsultant {
    max_dirs: usize,
}

impl ScopeConsultant {
    pub const ID: &'static str = "scope";

    pub fn new(max_dirs: usize) -> Self {
        Self {
            max_dirs: max_dirs.max(1),
        }
    }
}

#[async_trait]
impl Consultant for ScopeConsultant {
    fn id(&self) -> &str {
        Self::ID
    }

    fn focus(&self) -> ConsultantFocus {
        ConsultantFocus::Scope
    }

    async fn consult(&self, ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        let dirs = ctx.top_level_dirs();
        let risk = (dirs.len() as f64 / (2 * self.max_dirs) as f64).min(1.0);
        let approve = dirs.len() <= self.max_dirs;
        let advice = if approve {
            format!("change spans {} top-level area(s)", dirs.len())
        } else {
            format!(
                "change spans {} top-level areas (limit {}); consider splitting",
                dirs.len(),
                self.max_dirs
            )
        };
        Ok(Opinion::new(Self::ID, approve, advice, risk, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Urgency;

    #[tokio::test]
    async fn test_wide_change_rejected() {
        let ctx = ChangeContext::builder(Urgency::Normal)
            .files(["a/x.rs", "b/x.rs", "c/x.rs"])
            .complexity(0.3)
            .build()
            .unwrap();
        let o = ScopeConsultant::new(2).consult(&ctx).await.unwrap();
        assert!(!o.approve);
        assert!(o.advice.contains("splitting"));

        let o = ScopeConsultant::new(3).consult(&ctx).await.unwrap();
        assert!(o.approve);
        assert!((o.risk - 0.5).abs() < 1e-9);
    }
}
