//! # Fallback Cascade
//!
//! Failure classification, retry policy, per-provider concurrency limits and
//! the cascade executor that ties them to the circuit breakers in
//! [`crate::resilience`].

pub mod error_classifier;
pub mod fallback;
pub mod limiter;
pub mod retry;
pub mod types;

pub use error_classifier::{FailureClassifier, FailureKind, StandardFailureClassifier};
pub use fallback::FallbackCascade;
pub use limiter::ProviderConcurrencyLimiter;
pub use retry::RetryPolicy;
pub use types::{CascadeAttempt, CascadeResult, WorkUnit};
