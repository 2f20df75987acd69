//! # Provider Failure Classification
//!
//! Maps a [`ProviderError`] onto the [`FailureKind`] that drives retry
//! decisions in the cascade.
//!
//! Typed information wins: an HTTP status, a timeout or a connection error is
//! classified directly. Everything else falls through to substring heuristics
//! over the lowercased message, checked in this order: rate limit, token
//! limit, server error, timeout, request error.
//!
//! ```rust
//! use cascade_core::cascade::{FailureClassifier, FailureKind, StandardFailureClassifier};
//! use cascade_core::providers::ProviderError;
//!
//! let classifier = StandardFailureClassifier::new();
//! let error = ProviderError::http(400, "This model's maximum context length is 32768 tokens");
//! assert_eq!(classifier.classify(&error), FailureKind::TokenLimit);
//! ```

use crate::providers::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure categories with distinct retry behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Too many requests - retry with doubled backoff
    RateLimit,

    /// Payload too large for the provider - never retried on the same provider
    TokenLimit,

    /// Provider-side 5xx
    ServerError,

    /// No response within the attempt timeout
    Timeout,

    /// Network or transport failure
    RequestError,

    /// Unrecognised - moved on from immediately
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::RateLimit => write!(f, "RATE_LIMIT"),
            FailureKind::TokenLimit => write!(f, "TOKEN_LIMIT"),
            FailureKind::ServerError => write!(f, "SERVER_ERROR"),
            FailureKind::Timeout => write!(f, "TIMEOUT"),
            FailureKind::RequestError => write!(f, "REQUEST_ERROR"),
            FailureKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Strategy for classifying provider failures
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, error: &ProviderError) -> FailureKind;

    /// Get the classifier name for identification
    fn classifier_name(&self) -> &'static str;
}

const RATE_LIMIT_HINTS: &[&str] = &["rate limit", "rate_limit", "ratelimit", "too many requests", "quota"];
const TOKEN_LIMIT_HINTS: &[&str] = &[
    "context length",
    "context_length",
    "maximum context",
    "too many tokens",
    "token limit",
    "tokens exceed",
    "payload too large",
    "request too large",
];
const SERVER_ERROR_HINTS: &[&str] = &[
    "server error",
    "internal error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "overloaded",
];
const TIMEOUT_HINTS: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const REQUEST_ERROR_HINTS: &[&str] = &[
    "connection",
    "connect error",
    "dns",
    "reset by peer",
    "broken pipe",
    "network",
];

/// Default classifier: typed variants first, message heuristics second
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFailureClassifier;

impl StandardFailureClassifier {
    pub fn new() -> Self {
        Self
    }

    fn classify_status(status: u16) -> Option<FailureKind> {
        match status {
            429 => Some(FailureKind::RateLimit),
            413 => Some(FailureKind::TokenLimit),
            408 => Some(FailureKind::Timeout),
            500..=599 => Some(FailureKind::ServerError),
            _ => None,
        }
    }

    /// Classify free text by status codes embedded in it, then keywords
    pub fn classify_message(message: &str) -> FailureKind {
        let text = message.to_lowercase();
        let has = |hints: &[&str]| hints.iter().any(|hint| text.contains(hint));

        if contains_status_code(&text, &["429"]) || has(RATE_LIMIT_HINTS) {
            FailureKind::RateLimit
        } else if contains_status_code(&text, &["413"]) || has(TOKEN_LIMIT_HINTS) {
            FailureKind::TokenLimit
        } else if contains_status_code(&text, &["500", "502", "503", "504"]) || has(SERVER_ERROR_HINTS) {
            FailureKind::ServerError
        } else if has(TIMEOUT_HINTS) {
            FailureKind::Timeout
        } else if has(REQUEST_ERROR_HINTS) {
            FailureKind::RequestError
        } else {
            FailureKind::Unknown
        }
    }
}

impl FailureClassifier for StandardFailureClassifier {
    fn classify(&self, error: &ProviderError) -> FailureKind {
        match error {
            ProviderError::Http { status, message } => {
                Self::classify_status(*status).unwrap_or_else(|| Self::classify_message(message))
            }
            ProviderError::Timeout(_) => FailureKind::Timeout,
            ProviderError::Connection(_) => FailureKind::RequestError,
            ProviderError::Other(message) => Self::classify_message(message),
        }
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}

/// Whether any of `codes` appears in `text` as a standalone number
fn contains_status_code(text: &str, codes: &[&str]) -> bool {
    codes.iter().any(|code| {
        text.match_indices(code).any(|(start, _)| {
            let before = text[..start].chars().next_back();
            let after = text[start + code.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
        })
    })
}
