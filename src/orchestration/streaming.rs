//! # Streaming Scheduler
//!
//! Executes steps as they arrive on a channel, before the full plan is
//! known. A step starts as soon as every dependency it names has a result;
//! after each completion all pending steps are re-checked until nothing new
//! becomes ready.
//!
//! When the channel closes, steps still waiting on dependencies that never
//! arrived (or that wait on each other) complete with an "unresolved
//! dependency" failure, so every received step yields exactly one result.

use super::metrics::PlanMetrics;
use super::pipeline::StepPipeline;
use crate::error::StepExecutionError;
use crate::events::ExecutionEvent;
use crate::models::{Step, StepResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of a streaming run
#[derive(Debug, Clone)]
pub struct StreamingExecutionResult {
    pub task_id: String,
    pub results: HashMap<String, StepResult>,
    pub success: bool,
    pub metrics: PlanMetrics,
    /// Step ids in completion order
    pub completion_order: Vec<String>,
    /// Steps failed because their dependencies never completed
    pub unresolved: Vec<String>,
    pub wall_time: Duration,
}

#[derive(Debug, Clone)]
pub struct StreamingScheduler {
    pipeline: StepPipeline,
}

/// Bookkeeping for one streaming run
struct StreamState {
    pending: Vec<Step>,
    known: HashSet<String>,
    /// Launched steps without a result yet
    in_flight: HashSet<String>,
    results: HashMap<String, StepResult>,
    completion_order: Vec<String>,
}

impl StreamState {
    fn record(&mut self, result: StepResult) {
        self.in_flight.remove(&result.step_id);
        self.completion_order.push(result.step_id.clone());
        self.results.insert(result.step_id.clone(), result);
    }

    /// Launched steps whose task ended without handing back a result
    ///
    /// Only meaningful once every spawned task has been joined.
    fn take_lost(&mut self) -> Vec<String> {
        let mut lost: Vec<String> = self.in_flight.drain().collect();
        lost.sort_unstable();
        lost
    }
}

impl StreamingScheduler {
    pub(crate) fn new(pipeline: StepPipeline) -> Self {
        Self { pipeline }
    }

    /// Consume steps until the sender is dropped and all work has finished
    #[instrument(skip(self, steps, context), fields(task_id = %task_id))]
    pub async fn execute_stream(
        &self,
        task_id: &str,
        mut steps: mpsc::Receiver<Step>,
        context: &str,
    ) -> StreamingExecutionResult {
        let started = Instant::now();
        let context: Arc<str> = Arc::from(context);
        let mut state = StreamState {
            pending: Vec::new(),
            known: HashSet::new(),
            in_flight: HashSet::new(),
            results: HashMap::new(),
            completion_order: Vec::new(),
        };
        let mut running: JoinSet<StepResult> = JoinSet::new();
        let mut channel_open = true;

        info!(task_id = %task_id, "🚀 Starting streaming execution");

        loop {
            if running.is_empty() {
                self.fail_lost(task_id, &mut state);
            }
            self.launch_ready(task_id, &context, &mut state, &mut running);

            if !channel_open && running.is_empty() {
                break;
            }

            tokio::select! {
                received = steps.recv(), if channel_open => match received {
                    Some(step) => {
                        if state.known.insert(step.id.clone()) {
                            debug!(task_id = %task_id, step_id = %step.id, "Step received");
                            state.pending.push(step);
                        } else {
                            warn!(task_id = %task_id, step_id = %step.id, "Ignoring duplicate step id");
                        }
                    }
                    None => {
                        debug!(task_id = %task_id, "Step stream closed");
                        channel_open = false;
                    }
                },
                Some(joined) = running.join_next(), if !running.is_empty() => match joined {
                    Ok(result) => state.record(result),
                    Err(e) => error!(task_id = %task_id, error = %e, "Streaming step task failed to join"),
                },
            }
        }

        let unresolved = self.fail_unresolved(task_id, &mut state);

        let metrics = PlanMetrics::from_results(&state.results);
        let success = unresolved.is_empty() && state.results.values().all(|r| r.success);

        info!(
            task_id = %task_id,
            summary = %metrics.format_summary(),
            unresolved = unresolved.len(),
            "Streaming execution finished"
        );
        self.pipeline.publisher.publish(ExecutionEvent::PlanCompleted {
            task_id: task_id.to_string(),
            success,
            metrics: metrics.clone(),
        });

        StreamingExecutionResult {
            task_id: task_id.to_string(),
            results: state.results,
            success,
            metrics,
            completion_order: state.completion_order,
            unresolved,
            wall_time: started.elapsed(),
        }
    }

    /// Start every pending step whose dependencies all have results
    ///
    /// Blocked steps complete immediately, which can make further steps
    /// ready, so this loops until a pass changes nothing.
    fn launch_ready(
        &self,
        task_id: &str,
        context: &Arc<str>,
        state: &mut StreamState,
        running: &mut JoinSet<StepResult>,
    ) {
        loop {
            let (ready, waiting): (Vec<Step>, Vec<Step>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|step| step.dependencies.iter().all(|d| state.results.contains_key(d)));
            state.pending = waiting;

            if ready.is_empty() {
                return;
            }

            let mut completed_inline = false;
            for step in ready {
                if let Some(dependency) = self.pipeline.blocking_dependency(&step, &state.results) {
                    let result = StepPipeline::blocked_result(&step, dependency);
                    self.pipeline.publish_completed(task_id, &result);
                    state.record(result);
                    completed_inline = true;
                    continue;
                }

                let pipeline = self.pipeline.clone();
                let task_id = task_id.to_string();
                let context = Arc::clone(context);
                let dependencies = StepPipeline::dependency_results(&step, &state.results);
                debug!(task_id = %task_id, step_id = %step.id, "Dependencies satisfied, launching step");
                state.in_flight.insert(step.id.clone());
                running.spawn(async move { pipeline.run(&task_id, &step, &context, &dependencies).await });
            }

            if !completed_inline {
                return;
            }
        }
    }

    fn fail_lost(&self, task_id: &str, state: &mut StreamState) {
        for step_id in state.take_lost() {
            warn!(task_id = %task_id, step_id = %step_id, "Step task ended without a result");
            let result = StepPipeline::aborted_result(&step_id, "task was cancelled before completing");
            self.pipeline.publish_completed(task_id, &result);
            state.record(result);
        }
    }

    fn fail_unresolved(&self, task_id: &str, state: &mut StreamState) -> Vec<String> {
        let leftover = std::mem::take(&mut state.pending);
        let mut unresolved = Vec::with_capacity(leftover.len());

        for step in leftover {
            let missing: Vec<String> = step
                .dependencies
                .iter()
                .filter(|d| !state.results.contains_key(*d))
                .cloned()
                .collect();
            warn!(task_id = %task_id, step_id = %step.id, missing = ?missing, "Step never became ready");

            let error = StepExecutionError::UnresolvedDependency {
                step_id: step.id.clone(),
                missing,
            };
            let result = StepResult::failure(step.id.clone(), error.to_string());
            self.pipeline.publish_completed(task_id, &result);
            unresolved.push(step.id.clone());
            state.record(result);
        }

        unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::orchestration::PlanScheduler;
    use crate::providers::ProviderRegistry;

    fn empty_state() -> StreamState {
        StreamState {
            pending: Vec::new(),
            known: HashSet::new(),
            in_flight: HashSet::new(),
            results: HashMap::new(),
            completion_order: Vec::new(),
        }
    }

    #[test]
    fn test_recorded_steps_leave_in_flight() {
        let mut state = empty_state();
        state.in_flight.insert("a".to_string());
        state.in_flight.insert("b".to_string());

        state.record(StepResult::success("a", "done"));

        assert_eq!(state.take_lost(), vec!["b".to_string()]);
        assert!(state.in_flight.is_empty());
        assert_eq!(state.completion_order, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_lost_step_gets_aborted_result() {
        let scheduler = PlanScheduler::builder(EngineConfig::for_testing(), ProviderRegistry::default())
            .build()
            .unwrap();
        let mut events = scheduler.subscribe();
        let streaming = scheduler.streaming();

        let mut state = empty_state();
        state.in_flight.insert("gone".to_string());
        streaming.fail_lost("lost", &mut state);

        let result = &state.results["gone"];
        assert!(!result.success);
        assert!(result.error_message().contains("aborted"));
        assert_eq!(state.completion_order, vec!["gone".to_string()]);
        assert!(state.take_lost().is_empty());

        let published = events.recv().await.unwrap();
        assert!(matches!(
            published.event,
            ExecutionEvent::StepCompleted { ref step_id, success: false, .. } if step_id == "gone"
        ));
    }
}
