//! Batch scheduler integration tests

mod common;

use cascade_core::config::DependencyFailurePolicy;
use cascade_core::error::{SchedulerError, StructuralError};
use cascade_core::events::ExecutionEvent;
use cascade_core::models::Step;
use cascade_core::orchestration::{DirectoryOutputSink, InMemoryFileLoader, PlanScheduler};
use common::{fan_out_steps, plan, registry_with, server_error, test_config, MockProvider};
use std::sync::Arc;
use std::time::Duration;

fn scheduler(providers: &[Arc<MockProvider>]) -> PlanScheduler {
    PlanScheduler::builder(test_config(), registry_with(providers))
        .build()
        .unwrap()
}

fn blocking_scheduler(providers: &[Arc<MockProvider>]) -> PlanScheduler {
    let mut config = test_config();
    config.scheduler.dependency_failure_policy = DependencyFailurePolicy::Block;
    PlanScheduler::builder(config, registry_with(providers)).build().unwrap()
}

#[tokio::test]
async fn test_fan_out_plan_runs_in_dependency_order() {
    common::init_test_logging();
    let groq = MockProvider::new("groq").into_arc();
    let scheduler = scheduler(&[Arc::clone(&groq)]);

    let result = scheduler.execute(&plan("fan-out", fan_out_steps()), "").await.unwrap();

    assert!(result.success);
    assert_eq!(result.batches, vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]]);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.metrics.successful_steps, 3);
    assert_eq!(groq.unit_ids()[0], "a");

    // dependents see the root's output in their prompt
    let prompt = groq.prompt_for("b").unwrap();
    assert!(prompt.contains("## Output of step `a`"));
    assert!(prompt.contains("groq:a"));
    assert_eq!(result.result("c").unwrap().output, "groq:c");
}

#[tokio::test]
async fn test_failed_dependency_continues_with_marker() {
    let groq = MockProvider::new("groq").failing_unit("a", server_error()).into_arc();
    let scheduler = scheduler(&[Arc::clone(&groq)]);
    assert_eq!(scheduler.dependency_failure_policy(), DependencyFailurePolicy::Continue);

    let result = scheduler.execute(&plan("continue", fan_out_steps()), "").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_step_ids(), vec!["a"]);
    assert_eq!(result.successful_step_ids(), vec!["b", "c"]);
    assert!(groq.prompt_for("b").unwrap().contains("Step `a` failed"));
    // server errors get two attempts on the same provider
    assert_eq!(groq.calls_for("a"), 2);
}

#[tokio::test]
async fn test_failed_dependency_blocks_dependents() {
    let groq = MockProvider::new("groq").failing_unit("a", server_error()).into_arc();
    let scheduler = blocking_scheduler(&[Arc::clone(&groq)]);

    let result = scheduler.execute(&plan("block", fan_out_steps()), "").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_step_ids(), vec!["a", "b", "c"]);
    assert_eq!(groq.calls_for("b"), 0);
    assert_eq!(groq.calls_for("c"), 0);
    let blocked = result.result("b").unwrap();
    assert!(blocked.error_message().contains("blocked by failed dependency: a"));
}

#[tokio::test]
async fn test_blocking_is_transitive() {
    let groq = MockProvider::new("groq").failing_unit("a", server_error()).into_arc();
    let scheduler = blocking_scheduler(&[Arc::clone(&groq)]);
    let steps = vec![
        Step::new("a", "root"),
        Step::new("b", "middle").with_dependencies(["a"]),
        Step::new("c", "leaf").with_dependencies(["b"]),
    ];

    let result = scheduler.execute(&plan("chain", steps), "").await.unwrap();

    assert_eq!(result.results.len(), 3);
    assert!(result.result("c").unwrap().error_message().contains("dependency: b"));
    assert_eq!(groq.call_count(), 2);
}

#[tokio::test]
async fn test_cyclic_plan_is_rejected_before_any_call() {
    let groq = MockProvider::new("groq").into_arc();
    let scheduler = scheduler(&[Arc::clone(&groq)]);
    let steps = vec![
        Step::new("a", "one").with_dependencies(["c"]),
        Step::new("b", "two").with_dependencies(["a"]),
        Step::new("c", "three").with_dependencies(["b"]),
    ];

    let err = scheduler.execute(&plan("cycle", steps), "").await.unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::Structural(StructuralError::CyclicDependency { .. })
    ));
    assert_eq!(groq.call_count(), 0);
}

#[tokio::test]
async fn test_dangling_dependency_is_rejected() {
    let groq = MockProvider::new("groq").into_arc();
    let scheduler = scheduler(&[Arc::clone(&groq)]);
    let steps = vec![Step::new("a", "one").with_dependencies(["ghost"])];

    let err = scheduler.execute(&plan("dangling", steps), "").await.unwrap_err();

    assert!(matches!(err, SchedulerError::Structural(_)));
    assert_eq!(groq.call_count(), 0);
}

#[tokio::test]
async fn test_independent_steps_run_concurrently() {
    let groq = MockProvider::new("groq")
        .with_delay(Duration::from_millis(50))
        .into_arc();
    let scheduler = scheduler(&[Arc::clone(&groq)]);
    let steps = vec![
        Step::new("a", "one").with_files(["a.py"]),
        Step::new("b", "two").with_files(["b.py"]),
        Step::new("c", "three").with_files(["c.py"]),
    ];

    let result = scheduler.execute(&plan("parallel", steps), "").await.unwrap();

    assert!(result.success);
    assert_eq!(result.batches.len(), 1);
    assert!(groq.max_in_flight() >= 2, "expected overlap, got {}", groq.max_in_flight());
}

#[tokio::test]
async fn test_file_conflicts_serialize_the_batch() {
    let groq = MockProvider::new("groq")
        .with_delay(Duration::from_millis(30))
        .into_arc();
    let scheduler = scheduler(&[Arc::clone(&groq)]);
    let mut events = scheduler.subscribe();
    let steps = vec![
        Step::new("a", "add models").with_files(["src/app.py"]),
        Step::new("b", "add routes").with_files(["./src/app.py"]),
        Step::new("c", "add docs").with_files(["README.md"]),
    ];

    let result = scheduler.execute(&plan("conflict", steps), "").await.unwrap();

    assert!(result.success);
    assert_eq!(groq.max_in_flight(), 1);

    let mut serialized = None;
    while let Ok(published) = events.try_recv() {
        if let ExecutionEvent::BatchStarted { serialized: flag, .. } = published.event {
            serialized = Some(flag);
        }
    }
    assert_eq!(serialized, Some(true));
}

#[tokio::test]
async fn test_lifecycle_events_bracket_the_run() {
    let groq = MockProvider::new("groq").into_arc();
    let scheduler = scheduler(&[groq]);
    let mut events = scheduler.subscribe();

    scheduler.execute(&plan("events", fan_out_steps()), "").await.unwrap();

    let mut names = Vec::new();
    while let Ok(published) = events.try_recv() {
        names.push(published.name);
    }

    assert_eq!(names.first(), Some(&"plan.started"));
    assert_eq!(names.last(), Some(&"plan.completed"));
    assert_eq!(names.iter().filter(|n| **n == "step.started").count(), 3);
    assert_eq!(names.iter().filter(|n| **n == "step.completed").count(), 3);
    assert_eq!(names.iter().filter(|n| **n == "batch.completed").count(), 2);
}

#[tokio::test]
async fn test_reference_files_reach_the_prompt() {
    let groq = MockProvider::new("groq").into_arc();
    let loader = InMemoryFileLoader::new().with_file("docs/schema.sql", "CREATE TABLE users (id INT);");
    let scheduler = PlanScheduler::builder(test_config(), registry_with(&[Arc::clone(&groq)]))
        .with_file_loader(Arc::new(loader))
        .build()
        .unwrap();
    let steps = vec![Step::new("a", "write the user model").with_context_files(["docs/schema.sql"])];

    scheduler.execute(&plan("files", steps), "shared context").await.unwrap();

    let prompt = groq.prompt_for("a").unwrap();
    assert!(prompt.contains("## Reference: docs/schema.sql"));
    assert!(prompt.contains("CREATE TABLE users"));
    assert!(prompt.contains("shared context"));
}

#[tokio::test]
async fn test_output_merge_and_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let groq = MockProvider::new("groq").into_arc();
    let scheduler = PlanScheduler::builder(test_config(), registry_with(&[groq]))
        .with_output_sink(Arc::new(DirectoryOutputSink::new(dir.path())))
        .build()
        .unwrap();
    let plan = plan("merge", fan_out_steps()).with_output_merge("app.py", vec!["b".to_string(), "c".to_string()]);

    let result = scheduler.execute(&plan, "").await.unwrap();
    assert!(result.success);

    let task_dir = dir.path().join("merge");
    let merged = std::fs::read_to_string(task_dir.join("merged").join("app.py")).unwrap();
    assert_eq!(merged, "groq:b\n\ngroq:c");

    for step_id in ["a", "b", "c"] {
        assert!(task_dir.join("steps").join(format!("{step_id}.json")).exists());
    }
    let metrics: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(task_dir.join("metrics.json")).unwrap()).unwrap();
    assert_eq!(metrics["successful_steps"], 3);
}

#[tokio::test]
async fn test_no_providers_fails_every_step_without_error() {
    let scheduler = scheduler(&[]);

    let result = scheduler.execute(&plan("empty", fan_out_steps()), "").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.results.len(), 3);
    assert_eq!(result.metrics.failed_steps, 3);
}
