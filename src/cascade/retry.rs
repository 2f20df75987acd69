//! # Retry Policy
//!
//! Attempt budgets and exponential backoff for retries against a single
//! provider. Moving to the next provider is the cascade's job; this module
//! only answers "try this provider again, and after how long?".

use super::error_classifier::FailureKind;
use crate::config::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub server_error_max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            server_error_max_attempts: config.server_error_max_attempts,
            base_delay: config.base_delay(),
            multiplier: config.backoff_multiplier,
            max_delay: config.max_delay(),
        }
    }

    /// Total attempts allowed on one provider for a failure kind
    pub fn max_attempts_for(&self, kind: FailureKind) -> u32 {
        match kind {
            FailureKind::TokenLimit | FailureKind::Unknown => 1,
            FailureKind::ServerError => self.server_error_max_attempts,
            FailureKind::RateLimit | FailureKind::Timeout | FailureKind::RequestError => self.max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn should_retry(&self, kind: FailureKind, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts_for(kind)
    }

    /// Exponential delay for the `retry_index`-th retry (0-based), capped
    pub fn base_delay_for(&self, retry_index: u32) -> Duration {
        let factor = self.multiplier.powi(retry_index.min(i32::MAX as u32) as i32);
        let delay = self.base_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Delay before the `retry_index`-th retry for a failure kind
    ///
    /// Rate limits wait twice the capped exponential delay.
    pub fn delay_for(&self, kind: FailureKind, retry_index: u32) -> Duration {
        let delay = self.base_delay_for(retry_index);
        match kind {
            FailureKind::RateLimit => delay.saturating_mul(2),
            _ => delay,
        }
    }
}
