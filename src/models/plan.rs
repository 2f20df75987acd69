use crate::error::{PlanLoadError, StructuralError};
use crate::models::step::Step;
use crate::orchestration::dependency_graph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Concatenate the outputs of several steps into one file after execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMergeDirective {
    pub target_file: String,
    pub step_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_merge: Option<OutputMergeDirective>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A task plan: an ordered list of steps forming a dependency DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Generated when the document omits it
    #[serde(default = "generate_task_id")]
    pub task_id: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: PlanMetadata,
}

fn generate_task_id() -> String {
    format!("task-{}", Uuid::new_v4())
}

impl Plan {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            steps,
            metadata: PlanMetadata::default(),
        }
    }

    pub fn with_output_merge(mut self, target_file: impl Into<String>, step_ids: Vec<String>) -> Self {
        self.metadata.output_merge = Some(OutputMergeDirective {
            target_file: target_file.into(),
            step_ids,
        });
        self
    }

    /// Parse and validate a plan document
    pub fn from_json(document: &str) -> Result<Self, PlanLoadError> {
        let plan: Plan = serde_json::from_str(document)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Read, parse and validate a plan document from disk
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PlanLoadError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| PlanLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&document)
    }

    /// Check referential integrity, id uniqueness, complexity range and acyclicity
    pub fn validate(&self) -> Result<(), StructuralError> {
        dependency_graph::validate_steps(&self.steps)
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PLAN_JSON: &str = r#"{
        "task_id": "task-42",
        "description": "Build a small service",
        "steps": [
            {"id": "A", "description": "Define models", "complexity": 0.3},
            {"id": "B", "description": "Write API", "dependencies": ["A"]},
            {"id": "C", "description": "Write tests", "type": "validation", "dependencies": ["A"]}
        ],
        "metadata": {
            "output_merge": {"target_file": "service.py", "step_ids": ["A", "B"]},
            "planner": "v2"
        }
    }"#;

    #[test]
    fn test_from_json_parses_plan_and_metadata() {
        let plan = Plan::from_json(PLAN_JSON).unwrap();
        assert_eq!(plan.task_id, "task-42");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.step_ids(), vec!["A", "B", "C"]);

        let merge = plan.metadata.output_merge.as_ref().unwrap();
        assert_eq!(merge.target_file, "service.py");
        assert_eq!(merge.step_ids, vec!["A", "B"]);
        assert!(plan.metadata.extra.contains_key("planner"));
    }

    #[test]
    fn test_from_json_rejects_dangling_dependency() {
        let doc = r#"{"task_id": "t", "steps": [
            {"id": "A", "description": "x", "dependencies": ["Z"]}
        ]}"#;
        let err = Plan::from_json(doc).unwrap_err();
        assert!(matches!(
            err,
            PlanLoadError::Structural(StructuralError::DanglingDependency { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_malformed_document() {
        let err = Plan::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PlanLoadError::Parse(_)));
    }

    #[test]
    fn test_missing_task_id_is_generated() {
        let doc = r#"{"steps": [{"id": "A", "description": "x"}]}"#;
        let first = Plan::from_json(doc).unwrap();
        let second = Plan::from_json(doc).unwrap();
        assert!(first.task_id.starts_with("task-"));
        assert_ne!(first.task_id, second.task_id);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PLAN_JSON.as_bytes()).unwrap();

        let plan = Plan::from_json_file(file.path()).unwrap();
        assert_eq!(plan.step("B").unwrap().dependencies, vec!["A"]);

        let missing = Plan::from_json_file("/nonexistent/plan.json").unwrap_err();
        assert!(matches!(missing, PlanLoadError::Io { .. }));
    }
}
