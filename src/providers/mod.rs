//! # Providers
//!
//! Provider capability profiles, the client trait implemented by concrete
//! backends, and the registry the router and cascade consult.

pub mod client;
pub mod profile;
pub mod registry;

pub use client::{ProviderClient, ProviderError, ProviderRequest, ProviderResponse};
pub use profile::{CostEfficiency, ProviderCatalog, ProviderProfile, ProviderTier, RateLimit, Speed};
pub use registry::ProviderRegistry;
