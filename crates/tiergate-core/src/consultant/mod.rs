//! Advisory consultants.
//!
//! Each backend implements [`Consultant`] and is registered in a
//! [`ConsultantRegistry`]; the orchestrator only ever sees the trait object,
//! so backends can be added or removed without touching orchestration.
//!
//! # Module layout
//!
//! - [`risk`]: `RiskAnalysisConsultant`, the designated fast-tier consultant
//! - [`policy`]: `PolicyComplianceConsultant`
//! - [`testing`]: `TestCoverageConsultant`
//! - [`scope`]: `ScopeConsultant`

pub mod policy;
pub mod risk;
pub mod scope;
pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConsultantConfig;
use crate::domain::{ChangeContext, Opinion};
use crate::error::{GateError, GateResult};

pub use policy::PolicyComplianceConsultant;
pub use risk::RiskAnalysisConsultant;
pub use scope::ScopeConsultant;
pub use testing::TestCoverageConsultant;

/// What a consultant primarily looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultantFocus {
    Risk,
    Policy,
    Testing,
    Scope,
    General,
}

/// An independent advisory unit producing one opinion per change.
///
/// Implementations must be stateless per call and must yield at await points
/// so that a timed-out consultation can be cancelled by dropping its future.
#[async_trait]
pub trait Consultant: Send + Sync {
    /// Stable identifier, used as `Opinion::consultant`.
    fn id(&self) -> &str;

    fn focus(&self) -> ConsultantFocus {
        ConsultantFocus::General
    }

    async fn consult(&self, ctx: &ChangeContext) -> anyhow::Result<Opinion>;

    /// A more expensive second pass, run on the exhaustive tier for opinions
    /// above the deep-analysis risk threshold. Defaults to re-consulting.
    async fn deep_consult(&self, ctx: &ChangeContext, first: &Opinion) -> anyhow::Result<Opinion> {
        let _ = first;
        self.consult(ctx).await
    }
}

/// Ordered collection of consultants handed to the orchestrator.
#[derive(Clone, Default)]
pub struct ConsultantRegistry {
    consultants: Vec<Arc<dyn Consultant>>,
}

impl ConsultantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in heuristic backends.
    pub fn with_defaults(config: &ConsultantConfig) -> GateResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(RiskAnalysisConsultant::new(config)?));
        registry.register(Arc::new(PolicyComplianceConsultant::new(config)?));
        registry.register(Arc::new(TestCoverageConsultant::new()));
        registry.register(Arc::new(ScopeConsultant::new(config.max_top_level_dirs)));
        Ok(registry)
    }

    pub fn register(&mut self, consultant: Arc<dyn Consultant>) {
        self.consultants.push(consultant);
    }

    pub fn with(mut self, consultant: Arc<dyn Consultant>) -> Self {
        self.register(consultant);
        self
    }

    pub fn all(&self) -> &[Arc<dyn Consultant>] {
        &self.consultants
    }

    pub fn len(&self) -> usize {
        self.consultants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consultants.is_empty()
    }

    /// First risk-focused consultant, used alone on the fast tier.
    pub fn designated_risk(&self) -> Option<Arc<dyn Consultant>> {
        self.consultants
            .iter()
            .find(|c| c.focus() == ConsultantFocus::Risk)
            .cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.consultants.iter().map(|c| c.id().to_string()).collect()
    }
}

impl std::fmt::Debug for ConsultantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsultantRegistry")
            .field("consultants", &self.ids())
            .finish()
    }
}

/// Compile a list of path patterns, reporting the offending one on error.
pub(crate) fn compile_patterns(patterns: &[String]) -> GateResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| GateError::InvalidConfig(format!("bad path pattern {p:?}: {e}")))
        })
        .collect()
}

/// Whether a path looks like a test file.
pub(crate) fn is_test_path(path: &str) -> bool {
    path.starts_with("tests/")
        || path.contains("/tests/")
        || path.contains("/test/")
        || path.ends_with("_test.rs")
        || path.ends_with("_tests.rs")
        || path.contains(".test.")
        || path.contains(".spec.")
        || path
            .rsplit('/')
            .next()
            .is_some_and(|name| name.starts_with("test_"))
}
