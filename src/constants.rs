//! # System Constants
//!
//! Core constants that define the operational boundaries of the plan execution
//! engine: token estimation factors, routing bands, chunking limits, provider
//! names and event names.
//!
//! Values that operators are expected to tune live in [`crate::config`]; the
//! constants here are the defaults those settings start from.

/// Token estimation factors
pub mod estimation {
    /// Rough characters-per-token ratio for context and file content
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Weight of step complexity in the `1 + w * complexity` factor
    pub const COMPLEXITY_WEIGHT: f64 = 0.5;

    /// Proportional overhead buffer applied after multipliers
    pub const OVERHEAD_RATIO: f64 = 0.2;

    /// Fixed overhead added to every estimate
    pub const OVERHEAD_FIXED_TOKENS: u64 = 500;

    /// Lower bound for any estimate
    pub const MIN_TOKEN_ESTIMATE: u64 = 1_000;

    /// Complexity assumed when a plan omits it
    pub const DEFAULT_COMPLEXITY: f64 = 0.5;
}

/// Token bands used for tier selection
pub mod bands {
    /// Estimates strictly below this go to the fast tier
    pub const FAST_TIER_MAX_TOKENS: u64 = 10_000;

    /// Estimates up to and including this go to the balanced tier
    pub const BALANCED_TIER_MAX_TOKENS: u64 = 50_000;

    /// In fast mode, everything below this goes to the fast tier
    pub const FAST_MODE_CEILING_TOKENS: u64 = 20_000;
}

/// Chunk-need detection and chunk construction limits
pub mod chunking {
    /// Estimates above this are chunked (kept below the high-capacity band)
    pub const CHUNK_THRESHOLD_TOKENS: u64 = 40_000;

    /// Size each chunk should land near
    pub const TARGET_CHUNK_TOKENS: u64 = 20_000;

    /// Declaring more input files than this triggers chunking
    pub const MAX_INPUT_FILES: usize = 5;

    /// Description characters per estimated output line
    pub const CHARS_PER_ESTIMATED_LINE: usize = 8;

    /// Estimated output lines above this trigger chunking
    pub const MAX_ESTIMATED_LINES: usize = 500;

    /// Cap for bulleted section extraction
    pub const MAX_BULLETED_SECTIONS: usize = 4;

    /// Cap for component matches per keyword type
    pub const MAX_COMPONENTS_PER_KEYWORD: usize = 3;

    /// Iterative chunking never produces fewer chunks than this
    pub const MIN_ITERATIVE_CHUNKS: usize = 2;

    /// Complexity at or above which logic-based splitting is considered
    pub const LOGIC_COMPLEXITY_THRESHOLD: f64 = 0.7;
}

/// Names of the providers in the default catalog
pub mod providers {
    pub const GROQ: &str = "groq";
    pub const CEREBRAS: &str = "cerebras";
    pub const DEEPSEEK: &str = "deepseek";
    pub const MISTRAL: &str = "mistral";
    pub const GEMINI: &str = "gemini";
    pub const KIMI: &str = "kimi";
    pub const GEMINI_VISION: &str = "gemini_vision";
}

/// Execution lifecycle event names
pub mod events {
    pub const PLAN_STARTED: &str = "plan.started";
    pub const PLAN_COMPLETED: &str = "plan.completed";
    pub const BATCH_STARTED: &str = "batch.started";
    pub const BATCH_COMPLETED: &str = "batch.completed";
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const PROVIDER_FALLBACK: &str = "provider.fallback";
}

/// Separator between a parent step id and its chunk suffix
pub const CHUNK_ID_SEPARATOR: &str = "::chunk_";
