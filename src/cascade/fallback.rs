//! # Fallback Cascade
//!
//! Runs one [`WorkUnit`] against an ordered list of candidate providers.
//!
//! For every candidate the cascade:
//!
//! 1. skips it when it is not registered, reports itself unavailable, or its
//!    circuit breaker rejects the call;
//! 2. waits for a per-provider concurrency permit;
//! 3. submits under a per-attempt timeout (extended for large payloads);
//! 4. on failure classifies the error and either retries the same provider
//!    after a backoff delay or moves on to the next candidate.
//!
//! The first success ends the cascade. When every candidate is exhausted the
//! result carries the full attempt history and the last error message.

use super::error_classifier::{FailureClassifier, FailureKind, StandardFailureClassifier};
use super::limiter::ProviderConcurrencyLimiter;
use super::retry::RetryPolicy;
use super::types::{CascadeAttempt, CascadeResult, WorkUnit};
use crate::config::CascadeConfig;
use crate::events::{EventPublisher, ExecutionEvent};
use crate::logging::{log_error, log_provider_operation};
use crate::providers::{ProviderError, ProviderRegistry};
use crate::resilience::{CircuitBreakerError, CircuitBreakerManager, CircuitState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Provider fallback executor with retry and circuit breaking
pub struct FallbackCascade {
    config: CascadeConfig,
    retry_policy: RetryPolicy,
    classifier: Arc<dyn FailureClassifier>,
    breakers: Arc<CircuitBreakerManager>,
    limiter: Arc<ProviderConcurrencyLimiter>,
    registry: ProviderRegistry,
    publisher: Option<EventPublisher>,
}

impl std::fmt::Debug for FallbackCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCascade")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .field("classifier", &self.classifier.classifier_name())
            .field("providers", &self.registry.available_names())
            .finish()
    }
}

impl FallbackCascade {
    /// Create a cascade with its own breakers and concurrency limiter
    pub fn new(config: CascadeConfig, registry: ProviderRegistry) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::new(
            config.circuit_breaker.to_resilience_config(),
        ));
        let limiter = Arc::new(ProviderConcurrencyLimiter::new(
            registry.catalog().clone(),
            config.max_concurrent_per_provider,
        ));

        Self {
            retry_policy: RetryPolicy::from_config(&config.retry),
            classifier: Arc::new(StandardFailureClassifier::new()),
            breakers,
            limiter,
            registry,
            publisher: None,
            config,
        }
    }

    /// Share circuit breaker state with other cascades
    pub fn with_circuit_breakers(mut self, breakers: Arc<CircuitBreakerManager>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<ProviderConcurrencyLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_event_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Timeout applied to each attempt for a work unit
    pub fn attempt_timeout(&self, unit: &WorkUnit, requested: Option<Duration>) -> Duration {
        let base = requested.unwrap_or_else(|| self.config.default_timeout());
        if unit.estimated_tokens > self.config.large_payload_threshold_tokens {
            base.max(self.config.large_payload_timeout())
        } else {
            base
        }
    }

    /// Execute a work unit against the candidates in order
    #[instrument(skip(self, unit), fields(unit_id = %unit.id, candidates = candidates.len()))]
    pub async fn execute(
        &self,
        candidates: &[String],
        unit: &WorkUnit,
        timeout: Option<Duration>,
    ) -> CascadeResult {
        let started = Instant::now();
        let attempt_timeout = self.attempt_timeout(unit, timeout);
        let mut attempts = Vec::new();
        let mut last_error: Option<String> = None;

        for (index, provider) in candidates.iter().enumerate() {
            let Some(client) = self.registry.get(provider) else {
                let reason = format!("provider '{provider}' is not registered");
                debug!(provider = %provider, "Skipping unregistered provider");
                attempts.push(CascadeAttempt::skipped(provider.as_str(), reason.clone()));
                self.announce_fallback(unit, provider, None, &reason);
                continue;
            };

            if !client.is_available() {
                let reason = format!("provider '{provider}' is unavailable");
                debug!(provider = %provider, "Skipping unavailable provider");
                attempts.push(CascadeAttempt::skipped(provider.as_str(), reason.clone()));
                self.announce_fallback(unit, provider, None, &reason);
                continue;
            }

            let breaker = self.breakers.get_circuit_breaker(provider);
            let request = unit.to_request(self.registry.profile(provider).map(|p| p.max_output_tokens));
            let mut attempt_number = 0u32;

            loop {
                attempt_number += 1;

                // Permit is dropped before any backoff sleep
                let permit = self.limiter.acquire(provider).await;
                let attempt_started = Instant::now();
                let client_ref = &client;
                let request_ref = &request;
                let outcome = breaker
                    .call(move || async move {
                        match tokio::time::timeout(attempt_timeout, client_ref.submit(request_ref)).await {
                            Ok(result) => result,
                            Err(_) => Err(ProviderError::Timeout(attempt_timeout)),
                        }
                    })
                    .await;
                let duration = attempt_started.elapsed();
                drop(permit);

                match outcome {
                    Ok(response) => {
                        attempts.push(CascadeAttempt::succeeded(provider, attempt_number, duration, &response));
                        let fallback_used = index > 0;
                        info!(
                            unit_id = %unit.id,
                            provider = %provider,
                            attempt = attempt_number,
                            fallback_used = fallback_used,
                            duration_ms = duration.as_millis() as u64,
                            "✅ Provider call succeeded"
                        );
                        return CascadeResult {
                            unit_id: unit.id.clone(),
                            success: true,
                            provider: Some(provider.clone()),
                            response: Some(response),
                            attempts,
                            fallback_used,
                            last_error: None,
                            total_duration: started.elapsed(),
                        };
                    }
                    Err(CircuitBreakerError::CircuitOpen { .. }) => {
                        let reason = format!("circuit open for provider '{provider}'");
                        log_provider_operation("submit", provider, "circuit_open", None, Some(&unit.id));
                        attempts.push(CascadeAttempt::skipped(provider.as_str(), reason.clone()));
                        self.announce_fallback(unit, provider, None, &reason);
                        break;
                    }
                    Err(CircuitBreakerError::OperationFailed(error)) => {
                        let kind = self.classifier.classify(&error);
                        let message = error.to_string();
                        warn!(
                            unit_id = %unit.id,
                            provider = %provider,
                            attempt = attempt_number,
                            failure_kind = %kind,
                            error = %message,
                            "Provider call failed"
                        );
                        attempts.push(CascadeAttempt::failed(provider, attempt_number, duration, kind, message.clone()));
                        last_error = Some(format!("{provider}: {message}"));

                        if self.retry_policy.should_retry(kind, attempt_number)
                            && breaker.state() != CircuitState::Open
                        {
                            let delay = self.retry_policy.delay_for(kind, attempt_number - 1);
                            debug!(
                                provider = %provider,
                                failure_kind = %kind,
                                delay_ms = delay.as_millis() as u64,
                                "Retrying provider after backoff"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }

                        self.announce_fallback(unit, provider, Some(kind), &message);
                        break;
                    }
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| "no candidate provider could be attempted".to_string());
        log_error(
            "cascade",
            "execute",
            &last_error,
            Some(&format!("unit {} exhausted {} attempts", unit.id, attempts.len())),
        );

        CascadeResult {
            unit_id: unit.id.clone(),
            success: false,
            provider: None,
            response: None,
            attempts,
            fallback_used: false,
            last_error: Some(last_error),
            total_duration: started.elapsed(),
        }
    }

    fn announce_fallback(&self, unit: &WorkUnit, provider: &str, kind: Option<FailureKind>, reason: &str) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(ExecutionEvent::ProviderFallback {
                unit_id: unit.id.clone(),
                from_provider: provider.to_string(),
                failure_kind: kind,
                reason: reason.to_string(),
            });
        }
    }
}
