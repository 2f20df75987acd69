use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Input and output token counts reported by providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// Outcome of executing one step
///
/// Every step in a plan produces exactly one of these, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    pub output: String,
    pub tokens_used: TokenUsage,
    pub execution_time: Duration,
    pub cost: f64,
    pub error: Option<String>,
    /// Provider that produced the output (last chunk's provider when chunked)
    pub provider: Option<String>,
    pub fallback_used: bool,
    /// Number of chunks the step was split into, zero when unsplit
    pub chunks: usize,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn success(step_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            output: output.into(),
            tokens_used: TokenUsage::default(),
            execution_time: Duration::ZERO,
            cost: 0.0,
            error: None,
            provider: None,
            fallback_used: false,
            chunks: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            output: String::new(),
            tokens_used: TokenUsage::default(),
            execution_time: Duration::ZERO,
            cost: 0.0,
            error: Some(error.into()),
            provider: None,
            fallback_used: false,
            chunks: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_execution_time(mut self, execution_time: Duration) -> Self {
        self.execution_time = execution_time;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_provider(mut self, provider: Option<String>, fallback_used: bool) -> Self {
        self.provider = provider;
        self.fallback_used = fallback_used;
        self
    }

    pub fn with_chunks(mut self, chunks: usize) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
