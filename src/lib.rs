#![allow(clippy::doc_markdown)] // Allow technical terms like DeepSeek, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Cascade Core
//!
//! Plan execution engine for interchangeable, rate-limited code-generation
//! backends ("providers").
//!
//! ## Overview
//!
//! A [`models::Plan`] is a DAG of [`models::Step`]s. The engine decides what
//! runs when, on which provider, and how large a unit of work is submitted:
//!
//! - **Scheduling**: dependency-ordered batches with concurrent execution,
//!   file-conflict serialization, and a streaming variant for steps that
//!   arrive incrementally
//! - **Routing**: token estimation and tiered provider selection
//! - **Fallback cascade**: per-failure-type retry, exponential backoff and a
//!   sliding-window circuit breaker per provider
//! - **Chunking**: four splitting strategies with strategy-specific merging
//!
//! ## Module Organization
//!
//! - [`models`] - Plan, step and result types
//! - [`routing`] - Token estimator and context router
//! - [`chunking`] - Step chunker and output merge
//! - [`cascade`] - Failure classification, retry policy, fallback executor
//! - [`resilience`] - Circuit breakers
//! - [`providers`] - Provider profiles, client trait and registry
//! - [`orchestration`] - Batch and streaming schedulers
//! - [`events`] - Execution lifecycle events
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cascade_core::config::ConfigManager;
//! use cascade_core::models::Plan;
//! use cascade_core::orchestration::PlanScheduler;
//! use cascade_core::providers::ProviderRegistry;
//!
//! # async fn example() -> cascade_core::Result<()> {
//! cascade_core::logging::init_structured_logging();
//!
//! let config = ConfigManager::load()?;
//! let registry = ProviderRegistry::default();
//! // registry.register(Arc::new(MyGroqClient::new(api_key)));
//!
//! let scheduler = PlanScheduler::builder(config.config().clone(), registry).build()?;
//! let plan = Plan::from_json_file("plan.json")?;
//! let result = scheduler.execute(&plan, "").await?;
//!
//! for step_id in result.failed_step_ids() {
//!     println!("step {step_id} failed");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod chunking;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod providers;
pub mod resilience;
pub mod routing;

pub use cascade::{CascadeResult, FailureKind, FallbackCascade, WorkUnit};
pub use chunking::{ChunkingStrategy, StepChunker, StrategyKind};
pub use config::{ConfigManager, EngineConfig};
pub use error::{CoreError, PlanLoadError, Result, SchedulerError, StepExecutionError, StructuralError};
pub use events::{EventPublisher, ExecutionEvent};
pub use models::{Plan, Step, StepKind, StepResult};
pub use orchestration::{PlanExecutionResult, PlanMetrics, PlanScheduler, StreamingScheduler};
pub use providers::{ProviderClient, ProviderRegistry};
pub use routing::{ContextRouter, ExecutionMode, RoutingDecision};
