//! # Circuit Breaker Manager
//!
//! Owns one breaker per provider. The manager is injected into the cascade so
//! breaker state is scoped to whoever constructs it, and can be shared
//! between schedulers when that is wanted.

use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerStatus,
    SystemCircuitBreakerMetrics,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CircuitBreakerManager {
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,

    /// Configuration applied to every breaker the manager creates
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuit_breakers: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get or create the breaker for a provider
    pub fn get_circuit_breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.get(provider) {
            return Arc::clone(breaker.value());
        }

        let entry = self
            .circuit_breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(provider.to_string(), self.config.clone())));
        Arc::clone(entry.value())
    }

    /// Get all provider names with a breaker, sorted
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.circuit_breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn status(&self, provider: &str) -> Option<CircuitBreakerStatus> {
        self.circuit_breakers.get(provider).map(|b| b.status())
    }

    /// Status snapshots for every breaker, sorted by provider name
    pub fn statuses(&self) -> Vec<CircuitBreakerStatus> {
        let mut statuses: Vec<CircuitBreakerStatus> =
            self.circuit_breakers.iter().map(|e| e.value().status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn get_component_metrics(&self, provider: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers.get(provider).map(|b| b.metrics())
    }

    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Force close all circuit breakers
    pub fn force_close_all(&self) {
        warn!("🚨 Forcing all provider circuit breakers closed");
        for entry in self.circuit_breakers.iter() {
            entry.value().force_closed();
        }
    }

    pub fn remove_circuit_breaker(&self, provider: &str) -> bool {
        if self.circuit_breakers.remove(provider).is_some() {
            info!(component = provider, remaining = self.circuit_breakers.len(), "Removed circuit breaker");
            true
        } else {
            false
        }
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;
    use std::time::Duration;

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let manager = CircuitBreakerManager::default();
        let first = manager.get_circuit_breaker("groq");
        let second = manager.get_circuit_breaker("groq");
        assert!(Arc::ptr_eq(&first, &second));

        manager.get_circuit_breaker("gemini");
        assert_eq!(manager.list_components(), vec!["gemini", "groq"]);
    }

    #[test]
    fn test_statuses_and_metrics() {
        let manager = CircuitBreakerManager::new(CircuitBreakerConfig {
            failure_threshold: 1,
            window: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        });

        manager.get_circuit_breaker("groq").record_failure(Duration::from_millis(3));
        manager.get_circuit_breaker("kimi").record_success(Duration::from_millis(3));

        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "groq");
        assert_eq!(statuses[0].state, CircuitState::Open);
        assert_eq!(manager.status("kimi").unwrap().state, CircuitState::Closed);
        assert!(manager.status("mistral").is_none());

        let system = manager.get_system_metrics();
        assert_eq!(system.total_calls(), 2);
        assert_eq!(system.unhealthy_circuits(), vec!["groq"]);

        manager.force_close_all();
        assert_eq!(manager.status("groq").unwrap().state, CircuitState::Closed);
        assert!(manager.remove_circuit_breaker("groq"));
        assert!(manager.get_component_metrics("groq").is_none());
    }
}
