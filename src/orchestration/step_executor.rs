//! # Step Executor
//!
//! Runs one step through Router → (Chunker) → Cascade.
//!
//! [`StepExecutor::execute`] never fails: any [`StepExecutionError`] raised
//! along the way is turned into a failed [`StepResult`] so a single step can
//! never abort its batch.

use super::context::StepContextBundle;
use super::dependency_graph::compute_batches;
use super::prompt::build_prompt;
use crate::cascade::{CascadeResult, FallbackCascade, WorkUnit};
use crate::chunking::{merge_outputs, ChunkingStrategy, StepChunker};
use crate::error::StepExecutionError;
use crate::models::{Step, StepResult, TokenUsage};
use crate::routing::{ContextRouter, ExecutionMode, RoutingDecision};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug)]
pub struct StepExecutor {
    router: Arc<ContextRouter>,
    chunker: StepChunker,
    cascade: Arc<FallbackCascade>,
    chunking_enabled: bool,
    mode: ExecutionMode,
    attempt_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(router: Arc<ContextRouter>, chunker: StepChunker, cascade: Arc<FallbackCascade>) -> Self {
        let chunking_enabled = chunker.config().enabled;
        let mode = router.default_mode();
        Self {
            router,
            chunker,
            cascade,
            chunking_enabled,
            mode,
            attempt_timeout: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the cascade's default per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn cascade(&self) -> &Arc<FallbackCascade> {
        &self.cascade
    }

    /// Execute a step, converting every failure into a failed result
    pub async fn execute(&self, step: &Step, bundle: &StepContextBundle) -> StepResult {
        let started = Instant::now();
        match self.try_execute(step, bundle).await {
            Ok(result) => result,
            Err(error) => {
                warn!(step_id = %step.id, error = %error, "Step execution failed");
                StepResult::failure(step.id.clone(), error.to_string()).with_execution_time(started.elapsed())
            }
        }
    }

    #[instrument(skip(self, step, bundle), fields(step_id = %step.id))]
    pub async fn try_execute(&self, step: &Step, bundle: &StepContextBundle) -> Result<StepResult, StepExecutionError> {
        let started = Instant::now();
        let decision = self.route(step, bundle)?;
        debug!(step_id = %step.id, reason = %decision.reason, "Routing decision");

        if decision.should_chunk && self.chunking_enabled {
            return self.execute_chunked(step, bundle, &decision, started).await;
        }

        let prompt = build_prompt(step, bundle, &[]);
        let unit = WorkUnit::new(step.id.clone(), prompt, decision.estimated_tokens);
        let outcome = self
            .cascade
            .execute(&decision.candidates(), &unit, self.attempt_timeout)
            .await;

        Ok(step_result_from(step, &outcome, started.elapsed()))
    }

    fn route(&self, step: &Step, bundle: &StepContextBundle) -> Result<RoutingDecision, StepExecutionError> {
        self.router
            .route(step, &bundle.context_text, &bundle.loaded_files, self.mode)
            .map_err(|source| StepExecutionError::Routing {
                step_id: step.id.clone(),
                source,
            })
    }

    async fn execute_chunked(
        &self,
        step: &Step,
        bundle: &StepContextBundle,
        decision: &RoutingDecision,
        started: Instant,
    ) -> Result<StepResult, StepExecutionError> {
        let strategy = self.chunker.chunk(step, decision.estimated_tokens, None);
        let sub_steps = strategy.sub_steps(step);
        let layers = compute_batches(&sub_steps).map_err(|e| StepExecutionError::InvalidChunkPlan {
            step_id: step.id.clone(),
            reason: e.to_string(),
        })?;

        let mut outputs: HashMap<String, CascadeResult> = HashMap::with_capacity(sub_steps.len());

        for layer in &layers {
            let runs = layer.steps.iter().map(|sub| self.run_chunk(sub, bundle, &outputs));
            let finished = join_all(runs).await;

            for (sub, outcome) in layer.steps.iter().zip(finished) {
                let outcome = outcome?;
                if !outcome.success {
                    return Err(StepExecutionError::ChunkFailed {
                        step_id: step.id.clone(),
                        chunk_id: sub.id.clone(),
                        reason: outcome
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "no provider succeeded".to_string()),
                    });
                }
                outputs.insert(sub.id.clone(), outcome);
            }
        }

        Ok(self.merge_chunk_results(step, &strategy, &outputs, started.elapsed()))
    }

    async fn run_chunk(
        &self,
        sub: &Step,
        bundle: &StepContextBundle,
        completed: &HashMap<String, CascadeResult>,
    ) -> Result<CascadeResult, StepExecutionError> {
        // The chunk budget is already scaled; it must not be re-estimated
        // from the parent's context.
        let decision = self
            .router
            .route_with_estimate(sub, sub.estimated_tokens, self.mode)
            .map_err(|source| StepExecutionError::Routing {
                step_id: sub.id.clone(),
                source,
            })?;
        debug!(step_id = %sub.id, tier = %decision.tier, budget = sub.estimated_tokens, "Routed chunk");
        let prior: Vec<(&str, &str)> = sub
            .dependencies
            .iter()
            .filter_map(|id| completed.get(id).map(|r| (id.as_str(), r.output())))
            .collect();

        let prompt = build_prompt(sub, bundle, &prior);
        let unit = WorkUnit::new(sub.id.clone(), prompt, decision.estimated_tokens);
        Ok(self
            .cascade
            .execute(&decision.candidates(), &unit, self.attempt_timeout)
            .await)
    }

    fn merge_chunk_results(
        &self,
        step: &Step,
        strategy: &ChunkingStrategy,
        outputs: &HashMap<String, CascadeResult>,
        elapsed: Duration,
    ) -> StepResult {
        let ordered: Vec<&CascadeResult> = strategy
            .chunks
            .iter()
            .filter_map(|chunk| outputs.get(&chunk.id))
            .collect();

        let texts: Vec<String> = ordered.iter().map(|r| r.output().to_string()).collect();
        let merged = merge_outputs(strategy, &texts);

        let tokens = ordered
            .iter()
            .fold(TokenUsage::default(), |acc, r| acc + r.tokens());
        let cost: f64 = ordered.iter().map(|r| r.cost()).sum();
        let provider = ordered.last().and_then(|r| r.provider.clone());
        let fallback_used = ordered.iter().any(|r| r.fallback_used);

        info!(
            step_id = %step.id,
            strategy = %strategy.kind,
            chunks = strategy.chunks.len(),
            total_tokens = tokens.total(),
            "✅ Chunked step completed"
        );

        StepResult::success(step.id.clone(), merged)
            .with_tokens(tokens)
            .with_cost(cost)
            .with_execution_time(elapsed)
            .with_provider(provider, fallback_used)
            .with_chunks(strategy.chunks.len())
    }
}

fn step_result_from(step: &Step, outcome: &CascadeResult, elapsed: Duration) -> StepResult {
    if outcome.success {
        StepResult::success(step.id.clone(), outcome.output())
            .with_tokens(outcome.tokens())
            .with_cost(outcome.cost())
            .with_execution_time(elapsed)
            .with_provider(outcome.provider.clone(), outcome.fallback_used)
    } else {
        let reason = outcome
            .last_error
            .clone()
            .unwrap_or_else(|| "no provider succeeded".to_string());
        StepResult::failure(step.id.clone(), format!("all providers failed: {reason}")).with_execution_time(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::models::LoadedFile;
    use crate::providers::{ProviderClient, ProviderError, ProviderRegistry, ProviderRequest, ProviderResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Echoes the unit id, fails units listed in `fail`
    struct EchoClient {
        name: String,
        fail: Vec<String>,
        seen: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl ProviderClient for EchoClient {
        fn name(&self) -> &str {
            &self.name
        }

        async fn submit(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().push(request.clone());
            if self.fail.contains(&request.unit_id) {
                return Err(ProviderError::http(400, "bad request body"));
            }
            Ok(ProviderResponse::new(format!("out:{}", request.unit_id)).with_usage(10, 5, 0.001))
        }
    }

    fn executor(fail: &[&str]) -> (StepExecutor, Arc<EchoClient>) {
        let config = EngineConfig::for_testing();
        let client = Arc::new(EchoClient {
            name: "deepseek".to_string(),
            fail: fail.iter().map(|s| s.to_string()).collect(),
            seen: Mutex::new(Vec::new()),
        });
        let registry = ProviderRegistry::default().with_client(client.clone());
        let router = Arc::new(ContextRouter::new(
            config.router.clone(),
            config.chunking.clone(),
            registry.clone(),
        ));
        let cascade = Arc::new(FallbackCascade::new(config.cascade.clone(), registry));
        (
            StepExecutor::new(router, StepChunker::new(config.chunking), cascade),
            client,
        )
    }

    #[tokio::test]
    async fn test_unchunked_step_runs_through_cascade() {
        let (executor, client) = executor(&[]);
        let step = Step::new("a", "write a function");

        let result = executor.execute(&step, &StepContextBundle::default()).await;

        assert!(result.success);
        assert_eq!(result.output, "out:a");
        assert_eq!(result.provider.as_deref(), Some("deepseek"));
        assert_eq!(result.tokens_used, TokenUsage::new(10, 5));
        assert_eq!(result.chunks, 0);
        assert_eq!(client.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_large_multi_file_step_is_chunked_and_merged() {
        let (executor, client) = executor(&[]);
        let step = Step::new("big", "a.rs: part one\nb.rs: part two").with_files(["a.rs", "b.rs"]);
        let bundle = StepContextBundle {
            loaded_files: vec![LoadedFile::new("ref.md", "x".repeat(200_000))],
            ..Default::default()
        };

        let result = executor.execute(&step, &bundle).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.chunks, 2);
        assert_eq!(
            result.output,
            "// ===== FILE: a.rs =====\nout:big::chunk_0\n\n// ===== FILE: b.rs =====\nout:big::chunk_1"
        );
        assert_eq!(result.tokens_used, TokenUsage::new(20, 10));

        let seen = client.seen.lock();
        assert_eq!(seen.len(), 2);
        // 50_000 * 1.2 * 1.25 * 1.2 + 500 = 90_500 split in two
        assert!(seen.iter().all(|request| request.estimated_tokens == 45_250));
        assert!(seen[1].prompt.contains("## Previous part `big::chunk_0`\nout:big::chunk_0"));
    }

    #[tokio::test]
    async fn test_failed_chunk_fails_parent() {
        let (executor, _) = executor(&["big::chunk_1"]);
        let step = Step::new("big", "generate").with_files(["a.rs", "b.rs"]);
        let bundle = StepContextBundle {
            loaded_files: vec![LoadedFile::new("ref.md", "x".repeat(200_000))],
            ..Default::default()
        };

        let result = executor.execute(&step, &bundle).await;

        assert!(!result.success);
        assert!(result.error_message().contains("big::chunk_1"));
    }
}
