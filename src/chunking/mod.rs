//! # Step Chunking
//!
//! Splits oversized steps into dependent or independent sub-steps and merges
//! their outputs back per strategy.

pub mod chunker;
pub mod extractors;
pub mod merge;
pub mod types;

pub use chunker::StepChunker;
pub use extractors::{CodeComponent, ComponentKind, Section};
pub use merge::merge_outputs;
pub use types::{ChunkingStrategy, MergePlan, StepChunk, StrategyKind};
