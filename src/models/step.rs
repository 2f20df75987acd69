use crate::chunking::StrategyKind;
use crate::constants::estimation::DEFAULT_COMPLEXITY;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of work a step performs
///
/// The kind drives the token multiplier used by the estimator and the
/// framing of the prompt sent to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    CodeGeneration,
    Refactoring,
    Patch,
    Analysis,
    Validation,
    Review,
}

impl StepKind {
    /// Output-size multiplier relative to the input estimate
    pub fn token_multiplier(self) -> f64 {
        match self {
            StepKind::CodeGeneration => 1.2,
            StepKind::Refactoring => 1.0,
            StepKind::Analysis => 0.8,
            StepKind::Patch => 0.5,
            StepKind::Validation => 0.6,
            StepKind::Review => 0.7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::CodeGeneration => "code_generation",
            StepKind::Refactoring => "refactoring",
            StepKind::Patch => "patch",
            StepKind::Analysis => "analysis",
            StepKind::Validation => "validation",
            StepKind::Review => "review",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step execution context
///
/// Known keys are typed. Anything else in the plan document is preserved in
/// `extra` so newer plan producers do not break older engines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    /// Target file paths the step writes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Read-only reference files loaded into the prompt
    #[serde(default, alias = "files_to_read", skip_serializing_if = "Vec::is_empty")]
    pub context_files: Vec<String>,

    #[serde(default)]
    pub surgical_mode: bool,

    #[serde(default)]
    pub pre_reasoning: bool,

    #[serde(default)]
    pub requires_vision: bool,

    /// Explicit chunking strategy, overriding auto-detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_strategy: Option<StrategyKind>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Unit of work in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: StepKind,
    #[serde(default = "default_complexity")]
    pub complexity: f64,
    /// Planner's hint; the estimator never goes below it
    #[serde(default)]
    pub estimated_tokens: u64,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub validation_criteria: Vec<String>,
    #[serde(default)]
    pub context: StepContext,
}

fn default_complexity() -> f64 {
    DEFAULT_COMPLEXITY
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            kind: StepKind::default(),
            complexity: DEFAULT_COMPLEXITY,
            estimated_tokens: 0,
            dependencies: Vec::new(),
            validation_criteria: Vec::new(),
            context: StepContext::default(),
        }
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.context_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validation_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: StepContext) -> Self {
        self.context = context;
        self
    }

    /// Distinct normalized target paths in declaration order
    pub fn target_files(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.context.files.len());
        for file in &self.context.files {
            let normalized = normalize_path(file);
            if !normalized.is_empty() && !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
        seen
    }

    /// Total number of files the step declares, targets plus references
    pub fn declared_file_count(&self) -> usize {
        self.context.files.len() + self.context.context_files.len()
    }

    pub fn depends_on(&self, step_id: &str) -> bool {
        self.dependencies.iter().any(|d| d == step_id)
    }
}

/// Normalize a target path for conflict comparison
///
/// Leading `./` segments and surrounding whitespace are ignored, so
/// `./src/app.py` and `src/app.py` refer to the same file.
pub fn normalize_path(path: &str) -> String {
    let mut trimmed = path.trim();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest.trim_start_matches('/');
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_deserialization_defaults() {
        let step: Step = serde_json::from_value(json!({
            "id": "a",
            "description": "Write the parser"
        }))
        .unwrap();

        assert_eq!(step.kind, StepKind::CodeGeneration);
        assert_eq!(step.complexity, DEFAULT_COMPLEXITY);
        assert_eq!(step.estimated_tokens, 0);
        assert!(step.dependencies.is_empty());
        assert!(step.context.files.is_empty());
    }

    #[test]
    fn test_step_context_aliases_and_extra_keys() {
        let step: Step = serde_json::from_value(json!({
            "id": "b",
            "description": "Refactor",
            "type": "refactoring",
            "context": {
                "files": ["./src/app.py"],
                "files_to_read": ["docs/api.md"],
                "surgical_mode": true,
                "chunk_strategy": "section_based",
                "owner": "platform"
            }
        }))
        .unwrap();

        assert_eq!(step.kind, StepKind::Refactoring);
        assert_eq!(step.context.context_files, vec!["docs/api.md"]);
        assert!(step.context.surgical_mode);
        assert_eq!(step.context.chunk_strategy, Some(StrategyKind::SectionBased));
        assert_eq!(step.context.extra.get("owner"), Some(&json!("platform")));
        assert_eq!(step.target_files(), vec!["src/app.py"]);
    }

    #[test]
    fn test_unknown_step_kind_is_rejected() {
        let parsed: Result<Step, _> = serde_json::from_value(json!({
            "id": "c",
            "description": "x",
            "type": "deployment"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./a/b.rs"), "a/b.rs");
        assert_eq!(normalize_path("././a.rs"), "a.rs");
        assert_eq!(normalize_path("  a.rs "), "a.rs");
        assert_eq!(normalize_path("../a.rs"), "../a.rs");
    }

    #[test]
    fn test_target_files_are_distinct() {
        let step = Step::new("a", "x").with_files(["a.rs", "./a.rs", "b.rs"]);
        assert_eq!(step.target_files(), vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_kind_multipliers() {
        assert_eq!(StepKind::CodeGeneration.token_multiplier(), 1.2);
        assert_eq!(StepKind::Patch.token_multiplier(), 0.5);
        assert_eq!(StepKind::Review.to_string(), "review");
    }
}
