//! # Routing
//!
//! Token estimation and tier/provider selection for steps.

pub mod context_router;
pub mod token_estimator;

pub use context_router::{ContextRouter, ExecutionMode, RoutingDecision, RoutingError};
pub use token_estimator::TokenEstimator;
