//! # Plan Scheduler
//!
//! Single entry point for running a validated plan.
//!
//! 1. Validate the plan (fatal `StructuralError` before any provider call).
//! 2. Layer steps into dependency-ordered batches.
//! 3. Run each batch: concurrently as tokio tasks, or one step at a time with
//!    a fixed pause when two steps of the batch write the same file.
//! 4. After each batch persist results and running metrics, and publish
//!    batch progress.
//! 5. Apply the plan's output merge directive, if any.
//!
//! Every step produces exactly one [`StepResult`]. A step failure never
//! aborts the plan; dependents either continue with the failure noted in
//! their context or are blocked, per [`DependencyFailurePolicy`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cascade_core::config::EngineConfig;
//! use cascade_core::models::{Plan, Step};
//! use cascade_core::orchestration::PlanScheduler;
//! use cascade_core::providers::ProviderRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProviderRegistry::default();
//! // registry.register(Arc::new(MyDeepSeekClient::new(...)));
//!
//! let scheduler = PlanScheduler::builder(EngineConfig::default(), registry).build()?;
//! let plan = Plan::new(
//!     "task-1",
//!     "Build a CLI",
//!     vec![
//!         Step::new("a", "Write the argument parser"),
//!         Step::new("b", "Write the main loop").with_dependencies(["a"]),
//!     ],
//! );
//!
//! let result = scheduler.execute(&plan, "Rust 2021, no unsafe").await?;
//! println!("{}", result.metrics.format_summary());
//! # Ok(())
//! # }
//! ```

use super::context::{ContextAssembler, FileLoader, InMemoryFileLoader};
use super::dependency_graph::{compute_batches, detect_file_conflicts, ExecutionBatch};
use super::metrics::PlanMetrics;
use super::output::{NoopOutputSink, OutputSink};
use super::pipeline::StepPipeline;
use super::step_executor::StepExecutor;
use super::streaming::StreamingScheduler;
use crate::cascade::{FailureClassifier, FallbackCascade};
use crate::chunking::StepChunker;
use crate::config::{ConfigResult, DependencyFailurePolicy, EngineConfig, SchedulerConfig};
use crate::error::SchedulerError;
use crate::events::{EventPublisher, ExecutionEvent, PublishedEvent};
use crate::models::{Plan, StepResult};
use crate::providers::ProviderRegistry;
use crate::resilience::CircuitBreakerManager;
use crate::routing::{ContextRouter, ExecutionMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Outcome of one plan run
#[derive(Debug, Clone)]
pub struct PlanExecutionResult {
    pub task_id: String,
    pub results: HashMap<String, StepResult>,
    /// True only when every step succeeded
    pub success: bool,
    pub metrics: PlanMetrics,
    /// Step ids per batch, in execution order
    pub batches: Vec<Vec<String>>,
    pub wall_time: Duration,
}

impl PlanExecutionResult {
    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    pub fn failed_step_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.step_id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn successful_step_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .results
            .values()
            .filter(|r| r.success)
            .map(|r| r.step_id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}

pub struct PlanSchedulerBuilder {
    config: EngineConfig,
    registry: ProviderRegistry,
    file_loader: Option<Arc<dyn FileLoader>>,
    output_sink: Option<Arc<dyn OutputSink>>,
    publisher: Option<EventPublisher>,
    circuit_breakers: Option<Arc<CircuitBreakerManager>>,
    classifier: Option<Arc<dyn FailureClassifier>>,
    mode: Option<ExecutionMode>,
    attempt_timeout: Option<Duration>,
}

impl PlanSchedulerBuilder {
    pub fn with_file_loader(mut self, loader: Arc<dyn FileLoader>) -> Self {
        self.file_loader = Some(loader);
        self
    }

    pub fn with_output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.output_sink = Some(sink);
        self
    }

    pub fn with_event_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Share provider health across schedulers
    pub fn with_circuit_breakers(mut self, breakers: Arc<CircuitBreakerManager>) -> Self {
        self.circuit_breakers = Some(breakers);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ConfigResult<PlanScheduler> {
        self.config.validate()?;

        let publisher = self
            .publisher
            .unwrap_or_else(|| EventPublisher::new(self.config.scheduler.event_buffer_size));

        let mut cascade = FallbackCascade::new(self.config.cascade.clone(), self.registry.clone())
            .with_event_publisher(publisher.clone());
        if let Some(breakers) = self.circuit_breakers {
            cascade = cascade.with_circuit_breakers(breakers);
        }
        if let Some(classifier) = self.classifier {
            cascade = cascade.with_classifier(classifier);
        }
        let cascade = Arc::new(cascade);

        let router = Arc::new(ContextRouter::new(
            self.config.router.clone(),
            self.config.chunking.clone(),
            self.registry,
        ));

        let mut executor = StepExecutor::new(router, StepChunker::new(self.config.chunking.clone()), cascade);
        if let Some(mode) = self.mode {
            executor = executor.with_mode(mode);
        }
        if let Some(timeout) = self.attempt_timeout {
            executor = executor.with_attempt_timeout(timeout);
        }

        let loader = self
            .file_loader
            .unwrap_or_else(|| Arc::new(InMemoryFileLoader::new()));
        let assembler = Arc::new(ContextAssembler::new(
            loader,
            self.config.scheduler.max_total_file_bytes,
        ));

        Ok(PlanScheduler {
            pipeline: StepPipeline {
                executor: Arc::new(executor),
                assembler,
                publisher,
                policy: self.config.scheduler.dependency_failure_policy,
            },
            sink: self.output_sink.unwrap_or_else(|| Arc::new(NoopOutputSink)),
            config: self.config.scheduler,
        })
    }
}

/// Batch scheduler for complete plans
pub struct PlanScheduler {
    pipeline: StepPipeline,
    sink: Arc<dyn OutputSink>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for PlanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanScheduler")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl PlanScheduler {
    pub fn builder(config: EngineConfig, registry: ProviderRegistry) -> PlanSchedulerBuilder {
        PlanSchedulerBuilder {
            config,
            registry,
            file_loader: None,
            output_sink: None,
            publisher: None,
            circuit_breakers: None,
            classifier: None,
            mode: None,
            attempt_timeout: None,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn dependency_failure_policy(&self) -> DependencyFailurePolicy {
        self.pipeline.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.pipeline.publisher.subscribe()
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerManager> {
        self.pipeline.executor.cascade().circuit_breakers()
    }

    /// Streaming scheduler sharing this scheduler's providers and breakers
    pub fn streaming(&self) -> StreamingScheduler {
        StreamingScheduler::new(self.pipeline.clone())
    }

    /// Execute a plan
    #[instrument(skip(self, plan, context), fields(task_id = %plan.task_id, steps = plan.len()))]
    pub async fn execute(&self, plan: &Plan, context: &str) -> Result<PlanExecutionResult, SchedulerError> {
        let started = Instant::now();
        plan.validate()?;
        let batches = compute_batches(&plan.steps)?;

        info!(
            task_id = %plan.task_id,
            steps = plan.len(),
            batches = batches.len(),
            "🚀 Starting plan execution"
        );
        self.pipeline.publisher.publish(ExecutionEvent::PlanStarted {
            task_id: plan.task_id.clone(),
            total_steps: plan.len(),
            total_batches: batches.len(),
        });

        let context: Arc<str> = Arc::from(context);
        let mut results: HashMap<String, StepResult> = HashMap::with_capacity(plan.len());

        for batch in &batches {
            let batch_results = self.run_batch(&plan.task_id, batch, &context, &results).await;

            let succeeded = batch_results.iter().filter(|r| r.success).count();
            let failed = batch_results.len() - succeeded;

            for result in &batch_results {
                if let Err(e) = self.sink.persist_step(&plan.task_id, result).await {
                    warn!(task_id = %plan.task_id, step_id = %result.step_id, error = %e, "Failed to persist step output");
                }
            }
            for result in batch_results {
                results.insert(result.step_id.clone(), result);
            }

            let running = PlanMetrics::from_results(&results);
            if let Err(e) = self.sink.persist_metrics(&plan.task_id, &running).await {
                warn!(task_id = %plan.task_id, error = %e, "Failed to persist plan metrics");
            }

            info!(
                task_id = %plan.task_id,
                batch = batch.index,
                succeeded = succeeded,
                failed = failed,
                completed_steps = results.len(),
                total_steps = plan.len(),
                "Batch completed"
            );
            self.pipeline.publisher.publish(ExecutionEvent::BatchCompleted {
                task_id: plan.task_id.clone(),
                batch_index: batch.index,
                succeeded,
                failed,
            });
        }

        self.apply_output_merge(plan, &results).await;

        if results.len() != plan.len() {
            return Err(SchedulerError::InvariantViolation(format!(
                "{} steps produced {} results",
                plan.len(),
                results.len()
            )));
        }

        let metrics = PlanMetrics::from_results(&results);
        let success = results.values().all(|r| r.success);

        if success {
            info!(task_id = %plan.task_id, summary = %metrics.format_summary(), "✅ Plan execution succeeded");
        } else {
            warn!(task_id = %plan.task_id, summary = %metrics.format_summary(), "⚠️ Plan execution finished with failures");
        }
        debug!(
            task_id = %plan.task_id,
            breakers = %self.circuit_breakers().get_system_metrics().format_summary(),
            "Provider circuit breaker status"
        );
        self.pipeline.publisher.publish(ExecutionEvent::PlanCompleted {
            task_id: plan.task_id.clone(),
            success,
            metrics: metrics.clone(),
        });

        Ok(PlanExecutionResult {
            task_id: plan.task_id.clone(),
            results,
            success,
            metrics,
            batches: batches.iter().map(ExecutionBatch::step_ids).collect(),
            wall_time: started.elapsed(),
        })
    }

    async fn run_batch(
        &self,
        task_id: &str,
        batch: &ExecutionBatch,
        context: &Arc<str>,
        completed: &HashMap<String, StepResult>,
    ) -> Vec<StepResult> {
        let mut batch_results = Vec::with_capacity(batch.len());
        let mut runnable = Vec::with_capacity(batch.len());

        for step in &batch.steps {
            match self.pipeline.blocking_dependency(step, completed) {
                Some(dependency) => {
                    info!(step_id = %step.id, dependency = %dependency, "Step blocked by failed dependency");
                    let result = StepPipeline::blocked_result(step, dependency);
                    self.pipeline.publish_completed(task_id, &result);
                    batch_results.push(result);
                }
                None => runnable.push(step),
            }
        }

        let conflicts = detect_file_conflicts(&batch.steps);
        let serialized = !conflicts.is_empty();
        if serialized {
            warn!(
                task_id = %task_id,
                batch = batch.index,
                conflicts = ?conflicts,
                "File conflicts detected, running batch sequentially"
            );
        }

        self.pipeline.publisher.publish(ExecutionEvent::BatchStarted {
            task_id: task_id.to_string(),
            batch_index: batch.index,
            step_ids: batch.step_ids(),
            serialized,
        });

        if serialized {
            for (position, step) in runnable.into_iter().enumerate() {
                if position > 0 {
                    tokio::time::sleep(self.config.conflict_pause()).await;
                }
                let handle = self.spawn_step(task_id, step, context, completed);
                batch_results.push(Self::join_step(&step.id, handle).await);
            }
        } else {
            let handles: Vec<_> = runnable
                .into_iter()
                .map(|step| (step.id.clone(), self.spawn_step(task_id, step, context, completed)))
                .collect();
            debug!(task_id = %task_id, batch = batch.index, steps = handles.len(), "Running batch concurrently");
            for (step_id, handle) in handles {
                batch_results.push(Self::join_step(&step_id, handle).await);
            }
        }

        batch_results
    }

    fn spawn_step(
        &self,
        task_id: &str,
        step: &crate::models::Step,
        context: &Arc<str>,
        completed: &HashMap<String, StepResult>,
    ) -> tokio::task::JoinHandle<StepResult> {
        let pipeline = self.pipeline.clone();
        let task_id = task_id.to_string();
        let step = step.clone();
        let context = Arc::clone(context);
        let dependencies = StepPipeline::dependency_results(&step, completed);

        tokio::spawn(async move { pipeline.run(&task_id, &step, &context, &dependencies).await })
    }

    async fn join_step(step_id: &str, handle: tokio::task::JoinHandle<StepResult>) -> StepResult {
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(step_id = %step_id, error = %e, "Step task did not complete");
                StepPipeline::aborted_result(step_id, e.to_string())
            }
        }
    }

    async fn apply_output_merge(&self, plan: &Plan, results: &HashMap<String, StepResult>) {
        let Some(directive) = &plan.metadata.output_merge else {
            return;
        };

        let mut parts = Vec::with_capacity(directive.step_ids.len());
        for step_id in &directive.step_ids {
            match results.get(step_id) {
                Some(result) if result.success => parts.push(result.output.trim_end().to_string()),
                Some(_) => warn!(step_id = %step_id, "Skipping failed step in output merge"),
                None => warn!(step_id = %step_id, "Skipping unknown step in output merge"),
            }
        }

        let merged = parts.join("\n\n");
        match self
            .sink
            .write_merged(&plan.task_id, &directive.target_file, &merged)
            .await
        {
            Ok(()) => info!(
                task_id = %plan.task_id,
                target_file = %directive.target_file,
                parts = parts.len(),
                "Merged step outputs written"
            ),
            Err(e) => warn!(
                task_id = %plan.task_id,
                target_file = %directive.target_file,
                error = %e,
                "Failed to write merged output"
            ),
        }
    }
}
