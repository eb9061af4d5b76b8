//! The change under review.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// How urgently the author wants the change to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Emergency,
    High,
    Normal,
    Low,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emergency => write!(f, "emergency"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Wire shape of a [`ChangeContext`]; `complexity` may be omitted and is then
/// estimated from the file set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeContextSpec {
    pub urgency: Urgency,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub complexity: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Immutable description of one change.
///
/// # Invariants
///
/// `files` holds unique paths and `complexity` is finite and within 0.0–1.0.
/// Both are enforced at construction; there are no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChangeContextSpec")]
pub struct ChangeContext {
    urgency: Urgency,
    files: BTreeSet<String>,
    complexity: f64,
    description: String,
    metadata: BTreeMap<String, String>,
}

impl ChangeContext {
    /// Start building a context with the given urgency.
    pub fn builder(urgency: Urgency) -> ChangeContextBuilder {
        ChangeContextBuilder {
            spec: ChangeContextSpec {
                urgency,
                files: Vec::new(),
                complexity: None,
                description: String::new(),
                metadata: BTreeMap::new(),
            },
        }
    }

    pub fn urgency(&self) -> Urgency {
        self.urgency
    }

    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Parse and validate a context from JSON.
    pub fn from_json(json: &str) -> GateResult<Self> {
        let spec: ChangeContextSpec = serde_json::from_str(json)?;
        Self::try_from(spec)
    }

    /// Distinct top-level path components touched by the change.
    pub fn top_level_dirs(&self) -> BTreeSet<&str> {
        self.files
            .iter()
            .map(|f| f.split('/').next().unwrap_or(f.as_str()))
            .collect()
    }

    /// Complexity estimate used when the caller does not supply one.
    ///
    /// Weighs file count (saturating at 25 files) at 0.6 and the number of
    /// top-level directories (saturating at 5) at 0.4.
    pub fn estimate_complexity(files: &BTreeSet<String>) -> f64 {
        if files.is_empty() {
            return 0.0;
        }
        let dirs: BTreeSet<&str> = files
            .iter()
            .map(|f| f.split('/').next().unwrap_or(f.as_str()))
            .collect();
        let by_files = (files.len() as f64 / 25.0).min(1.0);
        let by_dirs = (dirs.len() as f64 / 5.0).min(1.0);
        (0.6 * by_files + 0.4 * by_dirs).clamp(0.0, 1.0)
    }
}

impl TryFrom<ChangeContextSpec> for ChangeContext {
    type Error = GateError;

    fn try_from(spec: ChangeContextSpec) -> GateResult<Self> {
        let mut files = BTreeSet::new();
        for f in spec.files {
            let trimmed = f.trim();
            if trimmed.is_empty() {
                return Err(GateError::InvalidContext("empty file path".to_string()));
            }
            files.insert(trimmed.to_string());
        }

        let complexity = match spec.complexity {
            Some(c) if !c.is_finite() || !(0.0..=1.0).contains(&c) => {
                return Err(GateError::InvalidContext(format!(
                    "complexity {c} outside 0.0–1.0"
                )));
            }
            Some(c) => c,
            None => Self::estimate_complexity(&files),
        };

        Ok(Self {
            urgency: spec.urgency,
            files,
            complexity,
            description: spec.description,
            metadata: spec.metadata,
        })
    }
}

/// Builder for [`ChangeContext`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ChangeContextBuilder {
    spec: ChangeContextSpec,
}

impl ChangeContextBuilder {
    pub fn file(mut self, path: impl Into<String>) -> Self {
        self.spec.files.push(path.into());
        self
    }

    pub fn files<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.files.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn complexity(mut self, complexity: f64) -> Self {
        self.spec.complexity = Some(complexity);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = description.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> GateResult<ChangeContext> {
        ChangeContext::try_from(self.spec)
    }
}
