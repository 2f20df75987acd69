//! # Context Router
//!
//! Maps a step to a provider tier from its estimated size, picks the primary
//! provider for that tier, orders the fallback chain and decides whether the
//! step must be chunked first.
//!
//! Tier bands (balanced mode):
//!
//! | Estimate | Tier |
//! |---|---|
//! | `< 10_000` | fast |
//! | `10_000..=50_000` | balanced |
//! | `> 50_000` | high capacity |
//!
//! Fast mode widens the fast band up to 20k tokens; quality mode sends
//! balanced-band work to the high capacity tier and leaves small work alone. Steps that need vision always go to the vision tier.

use super::token_estimator::TokenEstimator;
use crate::config::{ChunkingConfig, RouterConfig};
use crate::models::{LoadedFile, Step};
use crate::providers::{ProviderRegistry, ProviderTier};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Speed/quality trade-off applied to tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Fast,
    #[default]
    Balanced,
    Quality,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no provider available for {tier} tier (step '{step_id}')")]
    NoProviderAvailable { step_id: String, tier: ProviderTier },
}

/// Where and how a step should run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub step_id: String,
    pub primary_provider: String,
    pub tier: ProviderTier,
    pub estimated_tokens: u64,
    pub should_chunk: bool,
    /// Target tokens per chunk when chunking
    pub chunk_size_hint: Option<u64>,
    pub fallback_chain: Vec<String>,
    pub reason: String,
}

impl RoutingDecision {
    /// Primary followed by the fallback chain, the order the cascade tries
    pub fn candidates(&self) -> Vec<String> {
        std::iter::once(self.primary_provider.clone())
            .chain(self.fallback_chain.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ContextRouter {
    router: RouterConfig,
    chunking: ChunkingConfig,
    registry: ProviderRegistry,
    estimator: TokenEstimator,
}

impl ContextRouter {
    pub fn new(router: RouterConfig, chunking: ChunkingConfig, registry: ProviderRegistry) -> Self {
        Self {
            router,
            chunking,
            registry,
            estimator: TokenEstimator::new(),
        }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn default_mode(&self) -> ExecutionMode {
        self.router.execution_mode
    }

    /// Route a step given its assembled context and loaded files
    pub fn route(
        &self,
        step: &Step,
        context_text: &str,
        loaded_files: &[LoadedFile],
        mode: ExecutionMode,
    ) -> Result<RoutingDecision, RoutingError> {
        let estimated_tokens = self.estimator.estimate(step, context_text, loaded_files);
        self.route_with_estimate(step, estimated_tokens, mode)
    }

    /// Route from an already scaled token estimate
    ///
    /// Chunks use this with their own budget, which already carries the
    /// parent's kind, complexity and overhead factors.
    pub fn route_with_estimate(
        &self,
        step: &Step,
        estimated_tokens: u64,
        mode: ExecutionMode,
    ) -> Result<RoutingDecision, RoutingError> {
        let tier = self.select_tier(step, estimated_tokens, mode);

        let primary_provider = self
            .select_primary(tier)
            .ok_or_else(|| RoutingError::NoProviderAvailable {
                step_id: step.id.clone(),
                tier,
            })?;
        let fallback_chain = self.build_fallback_chain(&primary_provider, tier);

        let chunk_reason = self.chunk_reason(step, estimated_tokens);
        let should_chunk = chunk_reason.is_some();
        let chunk_size_hint = should_chunk.then(|| self.chunk_size(estimated_tokens));

        let mut reason = format!(
            "{tier} tier for ~{estimated_tokens} tokens in {mode:?} mode; primary {primary_provider}"
        );
        if step.context.requires_vision {
            reason.push_str(" (vision required)");
        }
        if let Some(preferred) = self.router.preferences.for_tier(tier).first() {
            if preferred != &primary_provider {
                reason.push_str(&format!(" because {preferred} is unavailable"));
            }
        }
        if let Some(chunk_reason) = &chunk_reason {
            reason.push_str(&format!("; chunking: {chunk_reason}"));
        }

        debug!(
            step_id = %step.id,
            tier = %tier,
            primary = %primary_provider,
            estimated_tokens = estimated_tokens,
            should_chunk = should_chunk,
            fallbacks = fallback_chain.len(),
            "Routed step"
        );

        Ok(RoutingDecision {
            step_id: step.id.clone(),
            primary_provider,
            tier,
            estimated_tokens,
            should_chunk,
            chunk_size_hint,
            fallback_chain,
            reason,
        })
    }

    /// Tier for an estimate under the given mode
    pub fn select_tier(&self, step: &Step, estimated_tokens: u64, mode: ExecutionMode) -> ProviderTier {
        if step.context.requires_vision {
            return ProviderTier::Vision;
        }

        match mode {
            ExecutionMode::Fast if estimated_tokens < self.router.fast_mode_ceiling_tokens => ProviderTier::Fast,
            ExecutionMode::Fast | ExecutionMode::Balanced => self.band(estimated_tokens),
            ExecutionMode::Quality => match self.band(estimated_tokens) {
                ProviderTier::Fast => ProviderTier::Fast,
                _ => ProviderTier::HighCapacity,
            },
        }
    }

    fn band(&self, estimated_tokens: u64) -> ProviderTier {
        if estimated_tokens < self.router.fast_tier_max_tokens {
            ProviderTier::Fast
        } else if estimated_tokens <= self.router.balanced_tier_max_tokens {
            ProviderTier::Balanced
        } else {
            ProviderTier::HighCapacity
        }
    }

    fn select_primary(&self, tier: ProviderTier) -> Option<String> {
        let preferences = self.router.preferences.for_tier(tier);
        preferences
            .iter()
            .chain(self.router.default_cascade.iter())
            .find(|name| self.registry.is_available(name))
            .cloned()
    }

    /// Default cascade minus the primary, led by the first same-or-higher
    /// tier alternative, restricted to available providers
    fn build_fallback_chain(&self, primary: &str, tier: ProviderTier) -> Vec<String> {
        let mut chain: Vec<String> = self
            .router
            .default_cascade
            .iter()
            .filter(|name| name.as_str() != primary)
            .cloned()
            .collect();

        let catalog = self.registry.catalog();
        let primary_tier = catalog.tier_of(primary).unwrap_or(tier);
        let alternative = self
            .router
            .preferences
            .for_tier(tier)
            .iter()
            .map(String::as_str)
            .chain(catalog.profiles().iter().map(|p| p.name.as_str()))
            .find(|name| {
                *name != primary
                    && self.registry.is_available(name)
                    && catalog
                        .tier_of(name)
                        .is_some_and(|candidate| candidate.at_least(primary_tier))
            });

        if let Some(alternative) = alternative {
            chain.retain(|name| name != alternative);
            chain.insert(0, alternative.to_string());
        }

        chain.retain(|name| self.registry.is_available(name));
        chain
    }

    fn chunk_reason(&self, step: &Step, estimated_tokens: u64) -> Option<String> {
        if estimated_tokens > self.chunking.chunk_threshold_tokens {
            return Some(format!(
                "estimate {estimated_tokens} exceeds {} tokens",
                self.chunking.chunk_threshold_tokens
            ));
        }

        let file_count = step.context.files.len();
        if file_count > self.chunking.max_input_files {
            return Some(format!(
                "{file_count} files exceed the limit of {}",
                self.chunking.max_input_files
            ));
        }

        let estimated_lines = step.description.len() / self.chunking.chars_per_estimated_line.max(1);
        if estimated_lines > self.chunking.max_estimated_lines {
            return Some(format!(
                "~{estimated_lines} output lines exceed {}",
                self.chunking.max_estimated_lines
            ));
        }

        None
    }

    fn chunk_size(&self, estimated_tokens: u64) -> u64 {
        let target = self.chunking.target_chunk_tokens.max(1);
        let chunk_count = estimated_tokens.div_ceil(target).max(1);
        estimated_tokens.div_ceil(chunk_count)
    }
}
