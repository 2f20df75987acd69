//! # Step Chunker
//!
//! Splits a step the router flagged as oversized into sub-steps and decides
//! how their outputs merge back.
//!
//! Strategy detection order:
//!
//! - **file based**: more than one distinct target file
//! - **section based**: a single target file and at least two parseable
//!   sections in the description
//! - **logic based**: at least two named code units and high complexity
//! - **iterative**: everything else
//!
//! Any strategy that would produce fewer than two chunks degrades to
//! iterative, which always produces at least two.

use super::extractors::{extract_components, extract_file_slice, extract_sections};
use super::types::{ChunkingStrategy, MergePlan, StepChunk, StrategyKind};
use crate::config::ChunkingConfig;
use crate::constants::chunking::MIN_ITERATIVE_CHUNKS;
use crate::models::Step;
use tracing::{debug, info};

const SUMMARY_MAX_CHARS: usize = 240;

#[derive(Debug, Clone, Default)]
pub struct StepChunker {
    config: ChunkingConfig,
}

impl StepChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Pick a strategy from the step's shape
    pub fn detect_strategy(&self, step: &Step) -> StrategyKind {
        let target_files = step.target_files();

        if target_files.len() > 1 {
            return StrategyKind::FileBased;
        }

        if target_files.len() == 1
            && extract_sections(&step.description, self.config.max_bulleted_sections).len() >= 2
        {
            return StrategyKind::SectionBased;
        }

        if step.complexity >= self.config.logic_complexity_threshold
            && extract_components(&step.description, self.config.max_components_per_keyword).len() >= 2
        {
            return StrategyKind::LogicBased;
        }

        StrategyKind::Iterative
    }

    /// Split a step
    ///
    /// `strategy` overrides the step's own `chunk_strategy`, which overrides
    /// detection.
    pub fn chunk(&self, step: &Step, estimated_tokens: u64, strategy: Option<StrategyKind>) -> ChunkingStrategy {
        let requested = strategy
            .or(step.context.chunk_strategy)
            .unwrap_or_else(|| self.detect_strategy(step));

        let built = match requested {
            StrategyKind::FileBased => self.file_based(step, estimated_tokens),
            StrategyKind::SectionBased => self.section_based(step, estimated_tokens),
            StrategyKind::LogicBased => self.logic_based(step, estimated_tokens),
            StrategyKind::Iterative => self.iterative(step, estimated_tokens),
        };

        let strategy = if built.chunks.len() < MIN_ITERATIVE_CHUNKS {
            debug!(
                step_id = %step.id,
                requested = %requested,
                chunks = built.chunks.len(),
                "Strategy produced too few chunks, falling back to iterative"
            );
            self.iterative(step, estimated_tokens)
        } else {
            built
        };

        info!(
            step_id = %step.id,
            strategy = %strategy.kind,
            chunks = strategy.chunks.len(),
            parallelizable = strategy.parallelizable,
            "📦 Step chunked"
        );

        strategy
    }

    fn file_based(&self, step: &Step, estimated_tokens: u64) -> ChunkingStrategy {
        let files = step.target_files();
        let total = files.len();
        let budget = per_chunk_budget(estimated_tokens, total);

        let chunks = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let description = match extract_file_slice(&step.description, file) {
                    Some(slice) => format!("Implement {file}: {slice}"),
                    None => format!("{}\n\nProduce only the contents of {file}.", step.description),
                };
                StepChunk {
                    id: StepChunk::chunk_id(&step.id, index),
                    parent_step_id: step.id.clone(),
                    index,
                    total,
                    strategy_kind: StrategyKind::FileBased,
                    label: Some(file.clone()),
                    description,
                    dependencies: previous_chunk(&step.id, index),
                    target_files: vec![file.clone()],
                    token_budget: budget,
                }
            })
            .collect();

        ChunkingStrategy {
            parent_step_id: step.id.clone(),
            kind: StrategyKind::FileBased,
            chunks,
            merge_plan: MergePlan::ConcatenateWithFileHeaders,
            parallelizable: false,
        }
    }

    fn section_based(&self, step: &Step, estimated_tokens: u64) -> ChunkingStrategy {
        let sections = extract_sections(&step.description, self.config.max_bulleted_sections);
        let total = sections.len();
        let budget = per_chunk_budget(estimated_tokens, total);
        let summary = summary_line(&step.description);

        let chunks = sections
            .into_iter()
            .enumerate()
            .map(|(index, section)| StepChunk {
                id: StepChunk::chunk_id(&step.id, index),
                parent_step_id: step.id.clone(),
                index,
                total,
                strategy_kind: StrategyKind::SectionBased,
                description: format!(
                    "{summary}\n\nPart {} of {total}, section \"{}\": {}",
                    index + 1,
                    section.name,
                    section.text
                ),
                label: Some(section.name),
                dependencies: previous_chunk(&step.id, index),
                target_files: step.target_files(),
                token_budget: budget,
            })
            .collect();

        ChunkingStrategy {
            parent_step_id: step.id.clone(),
            kind: StrategyKind::SectionBased,
            chunks,
            merge_plan: MergePlan::Concatenate,
            parallelizable: false,
        }
    }

    fn logic_based(&self, step: &Step, estimated_tokens: u64) -> ChunkingStrategy {
        let components = extract_components(&step.description, self.config.max_components_per_keyword);
        let total = components.len();
        let budget = per_chunk_budget(estimated_tokens, total);
        let summary = summary_line(&step.description);
        let all_independent = components.iter().all(|c| c.kind.is_independent());

        let chunks = components
            .into_iter()
            .enumerate()
            .map(|(index, component)| StepChunk {
                id: StepChunk::chunk_id(&step.id, index),
                parent_step_id: step.id.clone(),
                index,
                total,
                strategy_kind: StrategyKind::LogicBased,
                description: format!(
                    "{summary}\n\nImplement {} {} only.",
                    component.kind.as_str(),
                    component.name
                ),
                label: Some(component.name),
                dependencies: if component.kind.is_independent() {
                    Vec::new()
                } else {
                    previous_chunk(&step.id, index)
                },
                target_files: step.target_files(),
                token_budget: budget,
            })
            .collect();

        ChunkingStrategy {
            parent_step_id: step.id.clone(),
            kind: StrategyKind::LogicBased,
            chunks,
            merge_plan: if all_independent {
                MergePlan::Concatenate
            } else {
                MergePlan::LastWins
            },
            parallelizable: all_independent,
        }
    }

    fn iterative(&self, step: &Step, estimated_tokens: u64) -> ChunkingStrategy {
        let target = self.config.target_chunk_tokens.max(1);
        let total = (estimated_tokens.div_ceil(target) as usize).max(MIN_ITERATIVE_CHUNKS);
        let budget = per_chunk_budget(estimated_tokens, total);

        let chunks = (0..total)
            .map(|index| {
                let framing = if index == 0 {
                    "Produce the skeleton: overall structure, signatures and placeholders."
                } else if index + 1 == total {
                    "Finalize the implementation and ensure every part integrates."
                } else {
                    "Continue from the previous output and extend the implementation."
                };
                StepChunk {
                    id: StepChunk::chunk_id(&step.id, index),
                    parent_step_id: step.id.clone(),
                    index,
                    total,
                    strategy_kind: StrategyKind::Iterative,
                    label: None,
                    description: format!(
                        "{}\n\nIteration {} of {total}. {framing}",
                        step.description,
                        index + 1
                    ),
                    dependencies: previous_chunk(&step.id, index),
                    target_files: step.target_files(),
                    token_budget: budget,
                }
            })
            .collect();

        ChunkingStrategy {
            parent_step_id: step.id.clone(),
            kind: StrategyKind::Iterative,
            chunks,
            merge_plan: MergePlan::LastWins,
            parallelizable: false,
        }
    }
}

fn previous_chunk(step_id: &str, index: usize) -> Vec<String> {
    if index == 0 {
        Vec::new()
    } else {
        vec![StepChunk::chunk_id(step_id, index - 1)]
    }
}

fn per_chunk_budget(estimated_tokens: u64, chunks: usize) -> u64 {
    if chunks == 0 {
        return estimated_tokens;
    }
    estimated_tokens.div_ceil(chunks as u64)
}

fn summary_line(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or_default().trim();
    match first_line.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &first_line[..cut]),
        None => first_line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> StepChunker {
        StepChunker::new(ChunkingConfig::default())
    }

    #[test]
    fn test_multiple_files_use_file_strategy() {
        let step = Step::new("s", "src/a.rs: parser\nsrc/b.rs: printer").with_files(["src/a.rs", "./src/b.rs", "src/a.rs"]);
        let strategy = chunker().chunk(&step, 60_000, None);

        assert_eq!(strategy.kind, StrategyKind::FileBased);
        assert_eq!(strategy.chunks.len(), 2);
        assert!(!strategy.parallelizable);
        assert_eq!(strategy.merge_plan, MergePlan::ConcatenateWithFileHeaders);
        assert_eq!(strategy.chunks[0].description, "Implement src/a.rs: parser");
        assert_eq!(strategy.chunks[1].dependencies, vec!["s::chunk_0".to_string()]);
        assert_eq!(strategy.chunks[1].target_files, vec!["src/b.rs".to_string()]);
        assert_eq!(strategy.chunks[0].token_budget, 30_000);
    }

    #[test]
    fn test_single_file_with_sections_uses_section_strategy() {
        let step = Step::new("s", "Build the module (1) Types: structs (2) Logic: functions (3) Tests: unit tests")
            .with_files(["src/lib.rs"]);
        let strategy = chunker().chunk(&step, 45_000, None);

        assert_eq!(strategy.kind, StrategyKind::SectionBased);
        assert_eq!(strategy.chunks.len(), 3);
        assert_eq!(strategy.merge_plan, MergePlan::Concatenate);
        assert_eq!(strategy.chunks[2].label.as_deref(), Some("Tests"));
        assert_eq!(strategy.chunks[2].dependencies, vec!["s::chunk_1".to_string()]);
    }

    #[test]
    fn test_independent_components_are_parallelizable() {
        let step = Step::new("s", "Write class Parser and class Lexer plus function tokenize").with_complexity(0.9);
        let strategy = chunker().chunk(&step, 45_000, None);

        assert_eq!(strategy.kind, StrategyKind::LogicBased);
        assert_eq!(strategy.chunks.len(), 3);
        assert!(strategy.parallelizable);
        assert_eq!(strategy.merge_plan, MergePlan::Concatenate);
        assert!(strategy.chunks.iter().all(|c| c.dependencies.is_empty()));
    }

    #[test]
    fn test_dependent_components_use_last_wins() {
        let step = Step::new("s", "Add class Router then method register and route /health").with_complexity(0.8);
        let strategy = chunker().chunk(&step, 45_000, None);

        assert_eq!(strategy.kind, StrategyKind::LogicBased);
        assert!(!strategy.parallelizable);
        assert_eq!(strategy.merge_plan, MergePlan::LastWins);
        assert!(strategy.chunks[0].dependencies.is_empty());
        assert_eq!(strategy.chunks[1].dependencies, vec!["s::chunk_0".to_string()]);
    }

    #[test]
    fn test_low_complexity_components_stay_iterative() {
        let step = Step::new("s", "Write class Parser and class Lexer").with_complexity(0.3);
        assert_eq!(chunker().detect_strategy(&step), StrategyKind::Iterative);
    }

    #[test]
    fn test_iterative_framing_and_minimum_chunks() {
        let step = Step::new("s", "Generate a large report generator");
        let small = chunker().chunk(&step, 5_000, None);
        assert_eq!(small.kind, StrategyKind::Iterative);
        assert_eq!(small.chunks.len(), 2);

        let large = chunker().chunk(&step, 65_000, None);
        assert_eq!(large.chunks.len(), 4);
        assert!(large.chunks[0].description.contains("skeleton"));
        assert!(large.chunks[1].description.contains("Continue"));
        assert!(large.chunks[3].description.contains("Finalize"));
        assert_eq!(large.merge_plan, MergePlan::LastWins);
        assert!(large.chunks.iter().skip(1).all(|c| c.dependencies.len() == 1));
    }

    #[test]
    fn test_explicit_strategy_without_structure_falls_back() {
        let step = Step::new("s", "No sections here at all").with_files(["src/lib.rs"]);
        let strategy = chunker().chunk(&step, 30_000, Some(StrategyKind::SectionBased));
        assert_eq!(strategy.kind, StrategyKind::Iterative);
    }
}
