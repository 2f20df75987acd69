use crate::cascade::FailureKind;
use crate::constants::events;
use crate::orchestration::PlanMetrics;
use serde::{Deserialize, Serialize};

/// Execution lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    PlanStarted {
        task_id: String,
        total_steps: usize,
        total_batches: usize,
    },
    BatchStarted {
        task_id: String,
        batch_index: usize,
        step_ids: Vec<String>,
        /// File conflicts forced sequential execution
        serialized: bool,
    },
    StepStarted {
        task_id: String,
        step_id: String,
    },
    StepCompleted {
        task_id: String,
        step_id: String,
        success: bool,
        provider: Option<String>,
        execution_time_ms: u64,
        total_tokens: u64,
        cost: f64,
        error: Option<String>,
    },
    BatchCompleted {
        task_id: String,
        batch_index: usize,
        succeeded: usize,
        failed: usize,
    },
    ProviderFallback {
        unit_id: String,
        from_provider: String,
        failure_kind: Option<FailureKind>,
        reason: String,
    },
    PlanCompleted {
        task_id: String,
        success: bool,
        metrics: PlanMetrics,
    },
}

impl ExecutionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::PlanStarted { .. } => events::PLAN_STARTED,
            ExecutionEvent::BatchStarted { .. } => events::BATCH_STARTED,
            ExecutionEvent::StepStarted { .. } => events::STEP_STARTED,
            ExecutionEvent::StepCompleted { .. } => events::STEP_COMPLETED,
            ExecutionEvent::BatchCompleted { .. } => events::BATCH_COMPLETED,
            ExecutionEvent::ProviderFallback { .. } => events::PROVIDER_FALLBACK,
            ExecutionEvent::PlanCompleted { .. } => events::PLAN_COMPLETED,
        }
    }
}
