//! Token estimation for routing decisions.
//!
//! The estimate is deliberately coarse: character counts stand in for a
//! tokenizer, and multipliers per step kind approximate how much output a
//! step produces relative to its input.

use crate::constants::estimation::{
    CHARS_PER_TOKEN, COMPLEXITY_WEIGHT, MIN_TOKEN_ESTIMATE, OVERHEAD_FIXED_TOKENS, OVERHEAD_RATIO,
};
use crate::models::{LoadedFile, Step};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Estimate total tokens a step will consume
    ///
    /// Never returns less than the planner's hint scaled by the same factors,
    /// and never less than [`MIN_TOKEN_ESTIMATE`].
    pub fn estimate(&self, step: &Step, context_text: &str, loaded_files: &[LoadedFile]) -> u64 {
        let chars = context_text.chars().count() + loaded_files.iter().map(LoadedFile::char_count).sum::<usize>();
        let from_content = chars.div_ceil(CHARS_PER_TOKEN) as u64;
        let base = step.estimated_tokens.max(from_content);

        let complexity = step.complexity.clamp(0.0, 1.0);
        let scaled = base as f64 * step.kind.token_multiplier() * (1.0 + COMPLEXITY_WEIGHT * complexity);
        let with_overhead = scaled * (1.0 + OVERHEAD_RATIO) + OVERHEAD_FIXED_TOKENS as f64;

        (with_overhead.round() as u64).max(MIN_TOKEN_ESTIMATE)
    }
}
