//! # Plan Models
//!
//! Typed representation of a task plan: steps, their context, the plan
//! envelope and per-step results.

pub mod loaded_file;
pub mod plan;
pub mod step;
pub mod step_result;

// Re-export core models for easy access
pub use loaded_file::LoadedFile;
pub use plan::{OutputMergeDirective, Plan, PlanMetadata};
pub use step::{normalize_path, Step, StepContext, StepKind};
pub use step_result::{StepResult, TokenUsage};
