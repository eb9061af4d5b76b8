//! Test coverage expectations.

use async_trait::async_trait;
use chrono::Utc;

use super::{is_test_path, Consultant, ConsultantFocus};
use crate::domain::{ChangeContext, Opinion};

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "ts", "tsx", "js", "jsx", "go", "java", "kt", "swift", "rb", "c", "cc", "cpp", "h",
];

/// Rejects source changes that arrive without any test changes.
#[derive(Debug, Clone, Default)]
pub struct TestCoverageConsultant;

impl TestCoverageConsultant {
    pub const ID: &'static str = "test-coverage";

    pub fn new() -> Self {
        Self
    }
}

fn is_source(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
}

#[async_trait]
impl Consultant for TestCoverageConsultant {
    fn id(&self) -> &str {
        Self::ID
    }

    fn focus(&self) -> ConsultantFocus {
        ConsultantFocus::Testing
    }

    async fn consult(&self, ctx: &ChangeContext) -> anyhow::Result<Opinion> {
        let tests = ctx.files().iter().filter(|f| is_test_path(f)).count();
        let sources = ctx
            .files()
            .iter()
            .filter(|f| is_source(f) && !is_test_path(f))
            .count();

        let opinion = match (sources, tests) {
            (0, _) => Opinion::new(Self::ID, true, "no source files changed", 0.05, Utc::now()),
            (_, 0) => Opinion::new(
                Self::ID,
                false,
                format!("{sources} source file(s) changed without test changes"),
                (0.3 + 0.05 * sources as f64).min(0.8),
                Utc::now(),
            ),
            (s, t) => Opinion::new(
                Self::ID,
                true,
                format!("{s} source file(s) with {t} test file(s)"),
                0.1,
                Utc::now(),
            ),
        };
        Ok(opinion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Urgency;

    fn ctx(files: &[&str]) -> ChangeContext {
        ChangeContext::builder(Urgency::Normal)
            .files(files.iter().copied())
            .complexity(0.2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_source_without_tests_rejected() {
        let o = TestCoverageConsultant::new()
            .consult(&ctx(&["src/a.rs", "src/b.rs"]))
            .await
            .unwrap();
        assert!(!o.approve);
        assert!((o.risk - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_source_with_tests_approved() {
        let o = TestCoverageConsultant::new()
            .consult(&ctx(&["src/a.rs", "tests/a.rs"]))
            .await
            .unwrap();
        assert!(o.approve);
    }

    #[tokio::test]
    async fn test_docs_only_approved() {
        let o = TestCoverageConsultant::new()
            .consult(&ctx(&["README.md", "docs/guide.md"]))
            .await
            .unwrap();
        assert!(o.approve);
    }
}
