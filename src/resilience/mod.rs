//! # Resilience Module
//!
//! Per-provider circuit breakers that stop the cascade from hammering a
//! backend that keeps failing.
//!
//! ## Usage
//!
//! ```rust
//! use cascade_core::resilience::{CircuitBreakerConfig, CircuitBreakerManager, CircuitState};
//! use std::time::Duration;
//!
//! let manager = CircuitBreakerManager::new(CircuitBreakerConfig {
//!     failure_threshold: 2,
//!     window: Duration::from_secs(60),
//!     timeout: Duration::from_secs(30),
//! });
//!
//! let breaker = manager.get_circuit_breaker("groq");
//! breaker.record_failure(Duration::from_millis(120));
//! breaker.record_failure(Duration::from_millis(95));
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(!breaker.allow_request());
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitBreakerStatus, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
