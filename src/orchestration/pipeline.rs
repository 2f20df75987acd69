use super::context::ContextAssembler;
use super::step_executor::StepExecutor;
use crate::config::DependencyFailurePolicy;
use crate::error::StepExecutionError;
use crate::events::{EventPublisher, ExecutionEvent};
use crate::logging::log_step_operation;
use crate::models::{Step, StepResult};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Shared per-step machinery for the batch and streaming schedulers
#[derive(Debug, Clone)]
pub(crate) struct StepPipeline {
    pub(crate) executor: Arc<StepExecutor>,
    pub(crate) assembler: Arc<ContextAssembler>,
    pub(crate) publisher: EventPublisher,
    pub(crate) policy: DependencyFailurePolicy,
}

impl StepPipeline {
    /// Results of the step's own dependencies
    pub(crate) fn dependency_results(step: &Step, results: &HashMap<String, StepResult>) -> HashMap<String, StepResult> {
        step.dependencies
            .iter()
            .filter_map(|id| results.get(id).map(|r| (id.clone(), r.clone())))
            .collect()
    }

    /// First failed dependency when the policy blocks on failures
    pub(crate) fn blocking_dependency(&self, step: &Step, results: &HashMap<String, StepResult>) -> Option<String> {
        match self.policy {
            DependencyFailurePolicy::Continue => None,
            DependencyFailurePolicy::Block => step
                .dependencies
                .iter()
                .find(|id| results.get(*id).is_some_and(|r| !r.success))
                .cloned(),
        }
    }

    pub(crate) fn blocked_result(step: &Step, dependency: String) -> StepResult {
        let error = StepExecutionError::BlockedByDependency {
            step_id: step.id.clone(),
            dependency,
        };
        StepResult::failure(step.id.clone(), error.to_string())
    }

    pub(crate) fn aborted_result(step_id: &str, reason: impl Into<String>) -> StepResult {
        let error = StepExecutionError::TaskAborted {
            step_id: step_id.to_string(),
            reason: reason.into(),
        };
        StepResult::failure(step_id.to_string(), error.to_string())
    }

    /// Assemble context and execute one step, publishing start/completion
    ///
    /// A panic inside the step becomes a failed result.
    pub(crate) async fn run(
        &self,
        task_id: &str,
        step: &Step,
        caller_context: &str,
        dependencies: &HashMap<String, StepResult>,
    ) -> StepResult {
        self.publisher.publish(ExecutionEvent::StepStarted {
            task_id: task_id.to_string(),
            step_id: step.id.clone(),
        });

        let work = async {
            let bundle = self.assembler.assemble(step, caller_context, dependencies).await;
            self.executor.execute(step, &bundle).await
        };

        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(task_id = %task_id, step_id = %step.id, reason = %reason, "Step execution panicked");
                Self::aborted_result(&step.id, format!("panicked: {reason}"))
            }
        };

        log_step_operation(
            "execute",
            Some(task_id),
            Some(&step.id),
            if result.success { "completed" } else { "failed" },
            result.error.as_deref(),
        );
        self.publish_completed(task_id, &result);
        result
    }

    pub(crate) fn publish_completed(&self, task_id: &str, result: &StepResult) {
        self.publisher.publish(ExecutionEvent::StepCompleted {
            task_id: task_id.to_string(),
            step_id: result.step_id.clone(),
            success: result.success,
            provider: result.provider.clone(),
            execution_time_ms: result.execution_time.as_millis() as u64,
            total_tokens: result.tokens_used.total(),
            cost: result.cost,
            error: result.error.clone(),
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
