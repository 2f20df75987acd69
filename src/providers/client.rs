//! Provider client abstraction.
//!
//! Concrete HTTP backends live outside this crate. The engine only needs to
//! submit a prompt and receive either content with usage figures or a
//! [`ProviderError`] it can classify.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A single prompt submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Step or chunk id the request belongs to
    pub unit_id: String,
    pub prompt: String,
    pub estimated_tokens: u64,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl ProviderResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.cost = cost;
        self
    }
}

/// Failure reported by a provider client
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Remote code-generation backend
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Name matching the provider's catalog entry
    fn name(&self) -> &str;

    async fn submit(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Whether the client has credentials and is willing to take work
    fn is_available(&self) -> bool {
        true
    }
}
