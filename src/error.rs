//! Error types for the plan execution engine.
//!
//! Failures are localized to the smallest unit possible. Only a
//! [`StructuralError`] found while validating a plan is fatal; provider
//! failures stay inside the cascade and step failures become failed
//! `StepResult`s.

use crate::config::ConfigurationError;
use crate::routing::RoutingError;
use thiserror::Error;

/// Invalid plan structure, reported before any execution starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("duplicate step id '{step_id}'")]
    DuplicateStepId { step_id: String },

    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    DanglingDependency { step_id: String, dependency: String },

    #[error("circular dependency detected among steps: {}", step_ids.join(", "))]
    CyclicDependency { step_ids: Vec<String> },

    #[error("step '{step_id}' has complexity {complexity} outside [0, 1]")]
    InvalidComplexity { step_id: String, complexity: f64 },
}

/// Unexpected fault while executing a single step
///
/// These never propagate past the step: the scheduler converts them into a
/// failed `StepResult` carrying the display text.
#[derive(Debug, Error)]
pub enum StepExecutionError {
    #[error("routing failed for step '{step_id}': {source}")]
    Routing {
        step_id: String,
        #[source]
        source: RoutingError,
    },

    #[error("chunk '{chunk_id}' of step '{step_id}' failed: {reason}")]
    ChunkFailed {
        step_id: String,
        chunk_id: String,
        reason: String,
    },

    #[error("chunk plan for step '{step_id}' is invalid: {reason}")]
    InvalidChunkPlan { step_id: String, reason: String },

    #[error("execution of step '{step_id}' aborted: {reason}")]
    TaskAborted { step_id: String, reason: String },

    #[error("blocked by failed dependency: {dependency}")]
    BlockedByDependency { step_id: String, dependency: String },

    #[error("unresolved dependency: step '{step_id}' still waits on {}", missing.join(", "))]
    UnresolvedDependency { step_id: String, missing: Vec<String> },
}

/// Plan-level scheduling failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("scheduler invariant violated: {0}")]
    InvariantViolation(String),
}

/// Failures loading a plan document
#[derive(Debug, Error)]
pub enum PlanLoadError {
    #[error("failed to read plan file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid plan document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Crate-level error aggregating the module errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    PlanLoad(#[from] PlanLoadError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_error_messages() {
        let err = StructuralError::CyclicDependency {
            step_ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "circular dependency detected among steps: a, b");

        let err = StructuralError::DanglingDependency {
            step_id: "b".to_string(),
            dependency: "missing".to_string(),
        };
        assert!(err.to_string().contains("unknown step 'missing'"));
    }

    #[test]
    fn test_scheduler_error_wraps_structural() {
        let err: SchedulerError = StructuralError::DuplicateStepId {
            step_id: "a".to_string(),
        }
        .into();
        assert!(matches!(err, SchedulerError::Structural(_)));

        let core: CoreError = err.into();
        assert_eq!(core.to_string(), "duplicate step id 'a'");
    }
}
