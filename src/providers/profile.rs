//! Static provider capability profiles and the default catalog.

use crate::constants::providers::{CEREBRAS, DEEPSEEK, GEMINI, GEMINI_VISION, GROQ, KIMI, MISTRAL};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability tier a provider belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Fast,
    Balanced,
    HighCapacity,
    Vision,
}

impl ProviderTier {
    fn capacity_rank(self) -> u8 {
        match self {
            ProviderTier::Fast => 0,
            ProviderTier::Balanced => 1,
            ProviderTier::HighCapacity => 2,
            ProviderTier::Vision => 3,
        }
    }

    /// Whether this tier can stand in for `other`
    ///
    /// Text tiers are ordered fast < balanced < high capacity. Vision only
    /// substitutes for vision.
    pub fn at_least(self, other: ProviderTier) -> bool {
        match (self, other) {
            (ProviderTier::Vision, ProviderTier::Vision) => true,
            (ProviderTier::Vision, _) | (_, ProviderTier::Vision) => false,
            _ => self.capacity_rank() >= other.capacity_rank(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderTier::Fast => "fast",
            ProviderTier::Balanced => "balanced",
            ProviderTier::HighCapacity => "high_capacity",
            ProviderTier::Vision => "vision",
        }
    }
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    VeryFast,
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostEfficiency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
}

/// Static description of a provider's capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub name: String,
    pub tier: ProviderTier,
    pub max_input_tokens: u64,
    pub max_output_tokens: u32,
    pub speed: Speed,
    pub cost_efficiency: CostEfficiency,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub rate_limit: RateLimit,
}

impl ProviderProfile {
    pub fn new(name: impl Into<String>, tier: ProviderTier) -> Self {
        Self {
            name: name.into(),
            tier,
            max_input_tokens: 32_000,
            max_output_tokens: 8_192,
            speed: Speed::Medium,
            cost_efficiency: CostEfficiency::Medium,
            specialties: Vec::new(),
            rate_limit: RateLimit {
                requests_per_minute: 60,
                tokens_per_minute: 100_000,
            },
        }
    }

    pub fn with_limits(mut self, max_input_tokens: u64, max_output_tokens: u32) -> Self {
        self.max_input_tokens = max_input_tokens;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_speed(mut self, speed: Speed, cost_efficiency: CostEfficiency) -> Self {
        self.speed = speed;
        self.cost_efficiency = cost_efficiency;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: u32, tokens_per_minute: u64) -> Self {
        self.rate_limit = RateLimit {
            requests_per_minute,
            tokens_per_minute,
        };
        self
    }

    pub fn with_specialties(mut self, specialties: &[&str]) -> Self {
        self.specialties = specialties.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Ordered set of known provider profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCatalog {
    profiles: Vec<ProviderProfile>,
}

impl ProviderCatalog {
    pub fn new(profiles: Vec<ProviderProfile>) -> Self {
        Self { profiles }
    }

    pub fn empty() -> Self {
        Self { profiles: Vec::new() }
    }

    /// Catalog of the seven providers the default routing tables refer to
    pub fn default_catalog() -> Self {
        Self::new(vec![
            ProviderProfile::new(GROQ, ProviderTier::Fast)
                .with_limits(32_000, 8_192)
                .with_speed(Speed::VeryFast, CostEfficiency::High)
                .with_rate_limit(30, 6_000)
                .with_specialties(&["patch", "quick_edits"]),
            ProviderProfile::new(CEREBRAS, ProviderTier::Fast)
                .with_limits(8_000, 8_192)
                .with_speed(Speed::VeryFast, CostEfficiency::High)
                .with_rate_limit(30, 60_000)
                .with_specialties(&["patch"]),
            ProviderProfile::new(DEEPSEEK, ProviderTier::Balanced)
                .with_limits(64_000, 8_192)
                .with_speed(Speed::Medium, CostEfficiency::High)
                .with_rate_limit(60, 1_000_000)
                .with_specialties(&["code_generation", "refactoring"]),
            ProviderProfile::new(MISTRAL, ProviderTier::Balanced)
                .with_limits(32_000, 8_192)
                .with_speed(Speed::Fast, CostEfficiency::Medium)
                .with_rate_limit(60, 500_000)
                .with_specialties(&["code_generation"]),
            ProviderProfile::new(GEMINI, ProviderTier::HighCapacity)
                .with_limits(1_000_000, 8_192)
                .with_speed(Speed::Medium, CostEfficiency::Medium)
                .with_rate_limit(15, 1_000_000)
                .with_specialties(&["analysis", "large_context"]),
            ProviderProfile::new(KIMI, ProviderTier::HighCapacity)
                .with_limits(128_000, 8_192)
                .with_speed(Speed::Medium, CostEfficiency::Medium)
                .with_rate_limit(20, 500_000)
                .with_specialties(&["large_context", "review"]),
            ProviderProfile::new(GEMINI_VISION, ProviderTier::Vision)
                .with_limits(1_000_000, 8_192)
                .with_speed(Speed::Medium, CostEfficiency::Medium)
                .with_rate_limit(15, 1_000_000)
                .with_specialties(&["vision", "screenshots"]),
        ])
    }

    pub fn with_profile(mut self, profile: ProviderProfile) -> Self {
        self.upsert(profile);
        self
    }

    /// Insert or replace a profile by name
    pub fn upsert(&mut self, profile: ProviderProfile) {
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProviderProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn tier_of(&self, name: &str) -> Option<ProviderTier> {
        self.get(name).map(|p| p.tier)
    }

    pub fn by_tier(&self, tier: ProviderTier) -> impl Iterator<Item = &ProviderProfile> {
        self.profiles.iter().filter(move |p| p.tier == tier)
    }

    pub fn profiles(&self) -> &[ProviderProfile] {
        &self.profiles
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}
