use crate::constants::CHUNK_ID_SEPARATOR;
use crate::models::{Step, StepContext};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an oversized step is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One chunk per target file
    FileBased,
    /// One chunk per numbered or bulleted section of the description
    SectionBased,
    /// One chunk per named class, function, route, ...
    LogicBased,
    /// Skeleton, then extensions, then finalisation
    Iterative,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::FileBased => "file_based",
            StrategyKind::SectionBased => "section_based",
            StrategyKind::LogicBased => "logic_based",
            StrategyKind::Iterative => "iterative",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How chunk outputs combine into the parent step's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePlan {
    /// Each output stands alone, labelled with its target file
    ConcatenateWithFileHeaders,
    /// Outputs joined in chunk order
    Concatenate,
    /// Only the final chunk's output is kept
    LastWins,
}

/// One sub-unit of a chunked step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepChunk {
    pub id: String,
    pub parent_step_id: String,
    /// 0-based position
    pub index: usize,
    pub total: usize,
    pub strategy_kind: StrategyKind,
    /// Section, component or file name the chunk covers
    pub label: Option<String>,
    pub description: String,
    /// Ids of chunks that must finish first
    pub dependencies: Vec<String>,
    pub target_files: Vec<String>,
    pub token_budget: u64,
}

impl StepChunk {
    pub fn chunk_id(parent_step_id: &str, index: usize) -> String {
        format!("{parent_step_id}{CHUNK_ID_SEPARATOR}{index}")
    }

    /// Parent id of a chunk id, if the id names a chunk
    pub fn parent_of(chunk_id: &str) -> Option<&str> {
        chunk_id.split_once(CHUNK_ID_SEPARATOR).map(|(parent, _)| parent)
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }

    /// Schedulable step for this chunk
    ///
    /// Inherits the parent's kind, complexity and reference files. Target
    /// files narrow to the chunk's own when it names any.
    pub fn to_sub_step(&self, parent: &Step) -> Step {
        let files = if self.target_files.is_empty() {
            parent.context.files.clone()
        } else {
            self.target_files.clone()
        };

        let context = StepContext {
            files,
            context_files: parent.context.context_files.clone(),
            surgical_mode: parent.context.surgical_mode,
            pre_reasoning: parent.context.pre_reasoning,
            requires_vision: parent.context.requires_vision,
            chunk_strategy: None,
            extra: parent.context.extra.clone(),
        };

        Step::new(self.id.clone(), self.description.clone())
            .with_kind(parent.kind)
            .with_complexity(parent.complexity)
            .with_estimated_tokens(self.token_budget)
            .with_dependencies(self.dependencies.iter().cloned())
            .with_validation_criteria(parent.validation_criteria.iter().cloned())
            .with_context(context)
    }
}

/// Chunk list plus how to execute and merge it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingStrategy {
    pub parent_step_id: String,
    pub kind: StrategyKind,
    pub chunks: Vec<StepChunk>,
    pub merge_plan: MergePlan,
    /// Chunks without mutual dependencies may run concurrently
    pub parallelizable: bool,
}

impl ChunkingStrategy {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn sub_steps(&self, parent: &Step) -> Vec<Step> {
        self.chunks.iter().map(|chunk| chunk.to_sub_step(parent)).collect()
    }
}
