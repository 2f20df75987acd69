use super::error_classifier::FailureKind;
use crate::models::TokenUsage;
use crate::providers::{ProviderRequest, ProviderResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A prompt submitted through the cascade on behalf of a step or chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: String,
    pub prompt: String,
    pub estimated_tokens: u64,
    pub max_output_tokens: Option<u32>,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, estimated_tokens: u64) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            estimated_tokens,
            max_output_tokens: None,
        }
    }

    pub fn to_request(&self, max_output_tokens: Option<u32>) -> ProviderRequest {
        ProviderRequest {
            unit_id: self.id.clone(),
            prompt: self.prompt.clone(),
            estimated_tokens: self.estimated_tokens,
            max_output_tokens: self.max_output_tokens.or(max_output_tokens),
        }
    }
}

/// One try (or skip) of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeAttempt {
    pub provider: String,
    /// 1-based attempt number on this provider
    pub attempt_number: u32,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    /// Provider was not called (open circuit or unregistered)
    pub skipped: bool,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<String>,
    pub duration: Duration,
    pub tokens: TokenUsage,
    pub cost: f64,
}

impl CascadeAttempt {
    pub fn skipped(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            attempt_number: 0,
            attempted_at: Utc::now(),
            success: false,
            skipped: true,
            failure_kind: None,
            error: Some(reason.into()),
            duration: Duration::ZERO,
            tokens: TokenUsage::default(),
            cost: 0.0,
        }
    }

    pub fn succeeded(provider: &str, attempt_number: u32, duration: Duration, response: &ProviderResponse) -> Self {
        Self {
            provider: provider.to_string(),
            attempt_number,
            attempted_at: Utc::now(),
            success: true,
            skipped: false,
            failure_kind: None,
            error: None,
            duration,
            tokens: TokenUsage::new(response.input_tokens, response.output_tokens),
            cost: response.cost,
        }
    }

    pub fn failed(
        provider: &str,
        attempt_number: u32,
        duration: Duration,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            attempt_number,
            attempted_at: Utc::now(),
            success: false,
            skipped: false,
            failure_kind: Some(kind),
            error: Some(error.into()),
            duration,
            tokens: TokenUsage::default(),
            cost: 0.0,
        }
    }
}

/// Outcome of running a work unit through the cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeResult {
    pub unit_id: String,
    pub success: bool,
    pub provider: Option<String>,
    pub response: Option<ProviderResponse>,
    pub attempts: Vec<CascadeAttempt>,
    /// The winning provider was not the first candidate
    pub fallback_used: bool,
    pub last_error: Option<String>,
    pub total_duration: Duration,
}

impl CascadeResult {
    pub fn output(&self) -> &str {
        self.response.as_ref().map(|r| r.content.as_str()).unwrap_or("")
    }

    pub fn tokens(&self) -> TokenUsage {
        self.response
            .as_ref()
            .map(|r| TokenUsage::new(r.input_tokens, r.output_tokens))
            .unwrap_or_default()
    }

    pub fn cost(&self) -> f64 {
        self.response.as_ref().map(|r| r.cost).unwrap_or(0.0)
    }

    /// Attempts that actually reached a provider
    pub fn calls_made(&self) -> usize {
        self.attempts.iter().filter(|a| !a.skipped).count()
    }

    pub fn attempts_for(&self, provider: &str) -> Vec<&CascadeAttempt> {
        self.attempts.iter().filter(|a| a.provider == provider).collect()
    }
}
