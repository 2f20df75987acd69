//! # Circuit Breaker Implementation
//!
//! Sliding-window breaker guarding a single provider. Three states:
//! Closed (normal operation), Open (rejecting calls) and Half-Open (allowing
//! trial calls after the open timeout).
//!
//! Failures are kept as timestamps; only those within the rolling window
//! count toward the threshold. Any success closes the circuit and clears the
//! failure history.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - calls are rejected without executing
    Open,
    /// Testing recovery - trial calls allowed
    HalfOpen,
}

/// Errors from a call guarded by [`CircuitBreaker::call`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Read-only snapshot of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failures_in_window: usize,
    pub failure_threshold: u32,
    /// Time left before an open circuit admits a trial call
    pub retry_after: Option<Duration>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    metrics: CircuitBreakerMetrics,
}

/// Sliding-window circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Provider name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            window_ms = config.window.as_millis() as u64,
            timeout_ms = config.timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current circuit state
    ///
    /// An open circuit whose timeout has elapsed still reports `Open` until
    /// the next call is admitted.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => self.record_success(duration),
            Err(_) => self.record_failure(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Whether a call may proceed now
    ///
    /// Moves an open circuit to half-open once the open timeout elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|opened| opened.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed < self.config.timeout => {
                        inner.metrics.rejected_calls += 1;
                        false
                    }
                    Some(_) => {
                        self.transition_to_half_open(&mut inner);
                        true
                    }
                    None => {
                        warn!(component = %self.name, "Circuit open but no timestamp recorded");
                        true
                    }
                }
            }
        }
    }

    /// Record a successful call: closes the circuit and clears failure history
    pub fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Provider call succeeded"
        );

        inner.failures.clear();
        if inner.state != CircuitState::Closed {
            self.transition_to_closed(&mut inner);
        }
    }

    /// Record a failed call and open the circuit if the window threshold is hit
    pub fn record_failure(&self, duration: Duration) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;

        inner.failures.push_back(now);
        Self::prune(&mut inner.failures, now, self.config.window);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            failures_in_window = inner.failures.len(),
            "🔴 Provider call failed"
        );

        match inner.state {
            CircuitState::Closed => {
                if inner.failures.len() >= self.config.failure_threshold as usize {
                    self.transition_to_open(&mut inner);
                }
            }
            CircuitState::HalfOpen => self.transition_to_open(&mut inner),
            CircuitState::Open => {}
        }
    }

    fn prune(failures: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = failures.front() {
            if now.duration_since(*oldest) > window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition_to_closed(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.opened_at = None;

        info!(
            component = %self.name,
            total_calls = inner.metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.metrics.times_opened += 1;

        error!(
            component = %self.name,
            failures_in_window = inner.failures.len(),
            failure_threshold = self.config.failure_threshold,
            timeout_ms = self.config.timeout.as_millis() as u64,
            "🔴 Circuit breaker opened (rejecting calls)"
        );
    }

    fn transition_to_half_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::HalfOpen;

        info!(component = %self.name, "🟡 Circuit breaker half-open (allowing trial call)");
    }

    /// Force circuit to open state
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.transition_to_open(&mut inner);
    }

    /// Force circuit to closed state and forget recorded failures
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        inner.failures.clear();
        self.transition_to_closed(&mut inner);
    }

    /// Failures currently inside the rolling window
    pub fn failures_in_window(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::prune(&mut inner.failures, Instant::now(), self.config.window);
        inner.failures.len()
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let mut inner = self.inner.lock();
        Self::prune(&mut inner.failures, Instant::now(), self.config.window);

        let retry_after = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened)) => Some(self.config.timeout.saturating_sub(opened.elapsed())),
            _ => None,
        };

        CircuitBreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failures_in_window: inner.failures.len(),
            failure_threshold: self.config.failure_threshold,
            retry_after,
        }
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock();
        Self::prune(&mut inner.failures, Instant::now(), self.config.window);

        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.failures_in_window = inner.failures.len();
        snapshot.with_derived_rates()
    }
}
