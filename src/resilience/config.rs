//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single sliding-window breaker. The file-backed
//! form lives in `crate::config::CircuitBreakerSettings`, which converts into
//! this struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures within `window` that open the circuit
    pub failure_threshold: u32,

    /// Rolling window failures are counted over
    pub window: Duration,

    /// Time to wait in open state before allowing a trial call
    pub timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.window.is_zero() {
            return Err("window must be greater than 0".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.timeout > Duration::from_secs(3600) {
            return Err("timeout should not exceed one hour".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            timeout: Duration::from_secs(120),
        }
    }
}
