//! # Circuit Breaker Metrics
//!
//! Per-breaker counters and a system-wide aggregate used for status
//! reporting after a plan run.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the provider
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls turned away while the circuit was open
    pub rejected_calls: u64,

    /// Number of closed/half-open to open transitions
    pub times_opened: u64,

    /// Failures currently inside the rolling window
    pub failures_in_window: usize,

    /// Total duration of all calls
    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,

    /// Average call duration
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            times_opened: 0,
            failures_in_window: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Fill in the rates and average from the raw counters
    pub fn with_derived_rates(mut self) -> Self {
        if self.total_calls > 0 {
            self.failure_rate = self.failure_count as f64 / self.total_calls as f64;
            self.success_rate = self.success_count as f64 / self.total_calls as f64;
            self.average_duration = self.total_duration / self.total_calls as u32;
        }
        self
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.5,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Allowing trial calls",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {} | Rejected: {} | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.rejected_calls,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics across every provider breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,

    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: chrono::Utc::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = chrono::Utc::now();
    }

    /// Get count of circuit breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    /// Names of breakers currently not healthy, sorted
    pub fn unhealthy_circuits(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .circuit_breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// System-wide health score (0.0 to 1.0)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.failure_count).sum()
    }

    pub fn system_failure_rate(&self) -> f64 {
        let total_calls = self.total_calls();
        if total_calls == 0 {
            return 0.0;
        }
        self.total_failures() as f64 / total_calls as f64
    }

    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let closed_count = state_counts.get(&CircuitState::Closed).unwrap_or(&0);
        let open_count = state_counts.get(&CircuitState::Open).unwrap_or(&0);
        let half_open_count = state_counts.get(&CircuitState::HalfOpen).unwrap_or(&0);

        format!(
            "Provider breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}% | Failure rate: {:.2}%",
            self.circuit_breakers.len(),
            closed_count,
            open_count,
            half_open_count,
            self.health_score() * 100.0,
            self.system_failure_rate() * 100.0
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_rates() {
        let mut metrics = CircuitBreakerMetrics::new();
        metrics.total_calls = 4;
        metrics.success_count = 3;
        metrics.failure_count = 1;
        metrics.total_duration = Duration::from_millis(400);

        let metrics = metrics.with_derived_rates();
        assert_eq!(metrics.failure_rate, 0.25);
        assert_eq!(metrics.success_rate, 0.75);
        assert_eq!(metrics.average_duration, Duration::from_millis(100));
        assert!(metrics.is_healthy());
    }

    #[test]
    fn test_system_metrics_aggregation() {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        let mut groq = CircuitBreakerMetrics::new();
        groq.total_calls = 10;
        groq.success_count = 9;
        groq.failure_count = 1;

        let mut gemini = CircuitBreakerMetrics::new();
        gemini.current_state = CircuitState::Open;
        gemini.total_calls = 10;
        gemini.failure_count = 10;

        system_metrics.add_circuit_breaker("groq".to_string(), groq.with_derived_rates());
        system_metrics.add_circuit_breaker("gemini".to_string(), gemini.with_derived_rates());

        assert_eq!(system_metrics.total_calls(), 20);
        assert_eq!(system_metrics.total_failures(), 11);
        assert_eq!(system_metrics.system_failure_rate(), 0.55);
        assert_eq!(system_metrics.health_score(), 0.5);
        assert_eq!(system_metrics.unhealthy_circuits(), vec!["gemini"]);
        assert!(system_metrics.format_summary().contains("1 open"));
    }
}
