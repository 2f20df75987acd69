//! # Orchestration
//!
//! Plan execution core: dependency layering, step context assembly, the
//! per-step Router → Chunker → Cascade pipeline, and the batch and streaming
//! schedulers that drive it.

pub mod context;
pub mod dependency_graph;
pub mod metrics;
pub mod output;
pub(crate) mod pipeline;
pub mod prompt;
pub mod scheduler;
pub mod step_executor;
pub mod streaming;

pub use context::{ContextAssembler, FileLoadError, FileLoader, FsFileLoader, InMemoryFileLoader, StepContextBundle};
pub use dependency_graph::{compute_batches, detect_file_conflicts, validate_steps, ExecutionBatch, FileConflict};
pub use metrics::PlanMetrics;
pub use output::{DirectoryOutputSink, NoopOutputSink, OutputSink};
pub use scheduler::{PlanExecutionResult, PlanScheduler, PlanSchedulerBuilder};
pub use step_executor::StepExecutor;
pub use streaming::{StreamingExecutionResult, StreamingScheduler};
