//! # Engine Configuration
//!
//! Typed configuration for the plan execution engine. Every section carries
//! defaults that reproduce the reference routing, chunking and cascade
//! behaviour, so an empty configuration is a valid one.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cascade_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Layered load: config/cascade.toml, config/cascade.<env>.toml, CASCADE__* env vars
//! let manager = ConfigManager::load()?;
//!
//! let retry = &manager.config().cascade.retry;
//! let breaker = manager.config().cascade.circuit_breaker.to_resilience_config();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{bands, chunking, providers};
use crate::providers::ProviderTier;
use crate::routing::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub router: RouterConfig,
    pub chunking: ChunkingConfig,
    pub cascade: CascadeConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.router.validate()?;
        self.chunking.validate()?;
        self.cascade.validate()?;
        self.scheduler.validate()?;

        // Chunking must kick in before a step needs the high-capacity tier
        if self.chunking.chunk_threshold_tokens >= self.router.balanced_tier_max_tokens {
            return Err(ConfigurationError::invalid_value(
                "chunking.chunk_threshold_tokens",
                self.chunking.chunk_threshold_tokens,
                "must be below router.balanced_tier_max_tokens",
            ));
        }
        Ok(())
    }

    /// Configuration with millisecond delays for tests
    pub fn for_testing() -> Self {
        Self {
            router: RouterConfig::default(),
            chunking: ChunkingConfig::default(),
            cascade: CascadeConfig {
                default_timeout_secs: 5,
                large_payload_timeout_secs: 10,
                retry: RetryConfig {
                    base_delay_ms: 1,
                    max_delay_ms: 20,
                    ..RetryConfig::default()
                },
                circuit_breaker: CircuitBreakerSettings {
                    failure_threshold: 5,
                    window_ms: 60_000,
                    open_timeout_ms: 50,
                },
                ..CascadeConfig::default()
            },
            scheduler: SchedulerConfig {
                conflict_pause_ms: 5,
                ..SchedulerConfig::default()
            },
        }
    }
}

/// Provider preference lists per tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPreferences {
    pub fast: Vec<String>,
    pub balanced: Vec<String>,
    pub high_capacity: Vec<String>,
    pub vision: Vec<String>,
}

impl TierPreferences {
    pub fn for_tier(&self, tier: ProviderTier) -> &[String] {
        match tier {
            ProviderTier::Fast => &self.fast,
            ProviderTier::Balanced => &self.balanced,
            ProviderTier::HighCapacity => &self.high_capacity,
            ProviderTier::Vision => &self.vision,
        }
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for TierPreferences {
    fn default() -> Self {
        Self {
            fast: names(&[providers::GROQ, providers::CEREBRAS, providers::MISTRAL, providers::DEEPSEEK]),
            balanced: names(&[providers::DEEPSEEK, providers::MISTRAL, providers::GROQ, providers::GEMINI]),
            high_capacity: names(&[providers::GEMINI, providers::KIMI, providers::DEEPSEEK]),
            vision: names(&[providers::GEMINI_VISION, providers::GEMINI]),
        }
    }
}

/// Tier selection and provider ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub execution_mode: ExecutionMode,
    pub fast_tier_max_tokens: u64,
    pub balanced_tier_max_tokens: u64,
    pub fast_mode_ceiling_tokens: u64,
    pub preferences: TierPreferences,
    /// Global provider order the fallback chain is built from
    pub default_cascade: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Balanced,
            fast_tier_max_tokens: bands::FAST_TIER_MAX_TOKENS,
            balanced_tier_max_tokens: bands::BALANCED_TIER_MAX_TOKENS,
            fast_mode_ceiling_tokens: bands::FAST_MODE_CEILING_TOKENS,
            preferences: TierPreferences::default(),
            default_cascade: names(&[
                providers::DEEPSEEK,
                providers::GROQ,
                providers::GEMINI,
                providers::MISTRAL,
                providers::CEREBRAS,
                providers::KIMI,
            ]),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.fast_tier_max_tokens >= self.balanced_tier_max_tokens {
            return Err(ConfigurationError::invalid_value(
                "router.fast_tier_max_tokens",
                self.fast_tier_max_tokens,
                "must be below router.balanced_tier_max_tokens",
            ));
        }
        if self.default_cascade.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "router.default_cascade",
                "at least one provider must be listed",
            ));
        }
        Ok(())
    }
}

/// Chunk-need detection and chunk construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub enabled: bool,
    pub chunk_threshold_tokens: u64,
    pub target_chunk_tokens: u64,
    pub max_input_files: usize,
    pub chars_per_estimated_line: usize,
    pub max_estimated_lines: usize,
    pub max_bulleted_sections: usize,
    pub max_components_per_keyword: usize,
    pub logic_complexity_threshold: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_threshold_tokens: chunking::CHUNK_THRESHOLD_TOKENS,
            target_chunk_tokens: chunking::TARGET_CHUNK_TOKENS,
            max_input_files: chunking::MAX_INPUT_FILES,
            chars_per_estimated_line: chunking::CHARS_PER_ESTIMATED_LINE,
            max_estimated_lines: chunking::MAX_ESTIMATED_LINES,
            max_bulleted_sections: chunking::MAX_BULLETED_SECTIONS,
            max_components_per_keyword: chunking::MAX_COMPONENTS_PER_KEYWORD,
            logic_complexity_threshold: chunking::LOGIC_COMPLEXITY_THRESHOLD,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.target_chunk_tokens == 0 {
            return Err(ConfigurationError::invalid_value(
                "chunking.target_chunk_tokens",
                0,
                "target chunk size must be greater than 0",
            ));
        }
        if self.chars_per_estimated_line == 0 {
            return Err(ConfigurationError::invalid_value(
                "chunking.chars_per_estimated_line",
                0,
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.logic_complexity_threshold) {
            return Err(ConfigurationError::invalid_value(
                "chunking.logic_complexity_threshold",
                self.logic_complexity_threshold,
                "must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Retry behaviour within a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub server_error_max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            server_error_max_attempts: 2,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Sliding-window circuit breaker settings shared by every provider breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub window_ms: u64,
    pub open_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_ms: 60_000,
            open_timeout_ms: 120_000,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            window: Duration::from_millis(self.window_ms),
            timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }
}

/// Provider call behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub default_timeout_secs: u64,
    pub large_payload_timeout_secs: u64,
    /// Work units estimated above this use the large payload timeout
    pub large_payload_threshold_tokens: u64,
    pub max_concurrent_per_provider: usize,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 120,
            large_payload_timeout_secs: 300,
            large_payload_threshold_tokens: 30_000,
            max_concurrent_per_provider: 4,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl CascadeConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn large_payload_timeout(&self) -> Duration {
        Duration::from_secs(self.large_payload_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.default_timeout_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "cascade.default_timeout_secs",
                0,
                "timeout must be greater than 0",
            ));
        }
        if self.max_concurrent_per_provider == 0 {
            return Err(ConfigurationError::invalid_value(
                "cascade.max_concurrent_per_provider",
                0,
                "at least one in-flight call per provider is required",
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.server_error_max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "cascade.retry.max_attempts",
                0,
                "every failure kind needs at least one attempt",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "cascade.retry.backoff_multiplier",
                self.retry.backoff_multiplier,
                "multiplier must be at least 1.0",
            ));
        }
        self.circuit_breaker
            .to_resilience_config()
            .validate()
            .map_err(|reason| ConfigurationError::invalid_value("cascade.circuit_breaker", "-", reason))
    }
}

/// What happens to steps whose dependencies failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyFailurePolicy {
    /// Run dependents with a marker for each failed dependency
    #[default]
    Continue,
    /// Fail dependents without calling any provider
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between steps of a batch serialized by file conflicts
    pub conflict_pause_ms: u64,
    pub dependency_failure_policy: DependencyFailurePolicy,
    /// Cap on loaded file content per step context
    pub max_total_file_bytes: usize,
    /// Event channel capacity
    pub event_buffer_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            conflict_pause_ms: 500,
            dependency_failure_policy: DependencyFailurePolicy::Continue,
            max_total_file_bytes: 400_000,
            event_buffer_size: 1_000,
        }
    }
}

impl SchedulerConfig {
    pub fn conflict_pause(&self) -> Duration {
        Duration::from_millis(self.conflict_pause_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.event_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.event_buffer_size",
                0,
                "broadcast capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}
