//! Routing integration tests: estimates, tiers and provider selection as
//! seen through the router and the scheduler

mod common;

use cascade_core::config::{ChunkingConfig, RouterConfig};
use cascade_core::models::{LoadedFile, Step, StepContext, StepKind};
use cascade_core::orchestration::{InMemoryFileLoader, PlanScheduler};
use cascade_core::providers::{ProviderRegistry, ProviderTier};
use cascade_core::routing::{ContextRouter, ExecutionMode};
use common::{plan, registry_with, test_config, MockProvider};
use std::sync::Arc;

const ALL_PROVIDERS: &[&str] = &["groq", "cerebras", "deepseek", "mistral", "gemini", "kimi", "gemini_vision"];

fn full_registry() -> ProviderRegistry {
    let providers: Vec<_> = ALL_PROVIDERS.iter().map(|name| MockProvider::new(name).into_arc()).collect();
    registry_with(&providers)
}

fn router() -> ContextRouter {
    ContextRouter::new(RouterConfig::default(), ChunkingConfig::default(), full_registry())
}

#[test]
fn test_large_reference_file_routes_to_balanced_tier() {
    let step = Step::new("model", "generate the ORM layer")
        .with_kind(StepKind::CodeGeneration)
        .with_complexity(0.5)
        .with_estimated_tokens(2_000);
    let file = LoadedFile::new("schema.py", "x".repeat(40_000));

    let decision = router().route(&step, "", &[file], ExecutionMode::Balanced).unwrap();

    assert_eq!(decision.estimated_tokens, 18_500);
    assert_eq!(decision.tier, ProviderTier::Balanced);
    assert_eq!(decision.primary_provider, "deepseek");
    assert!(!decision.should_chunk);
    assert!(!decision.fallback_chain.contains(&"deepseek".to_string()));
}

#[test]
fn test_estimate_is_monotonic_in_hint() {
    let router = router();
    let mut previous = 0;
    for hint in [0, 1_000, 5_000, 20_000, 80_000] {
        let step = Step::new("s", "x").with_estimated_tokens(hint);
        let estimate = router.estimator().estimate(&step, "", &[]);
        assert!(estimate >= previous);
        previous = estimate;
    }
}

#[test]
fn test_quality_mode_lifts_medium_work_only() {
    let router = router();

    let small = Step::new("s", "small fix").with_kind(StepKind::Patch);
    let decision = router.route(&small, "", &[], ExecutionMode::Quality).unwrap();
    assert_eq!(decision.tier, ProviderTier::Fast);
    assert_eq!(decision.primary_provider, "groq");

    // 20_000 * 1.2 * 1.25 * 1.2 + 500 = 36_500, balanced band
    let medium = Step::new("m", "service layer")
        .with_complexity(0.5)
        .with_estimated_tokens(20_000);
    let decision = router.route(&medium, "", &[], ExecutionMode::Quality).unwrap();
    assert_eq!(decision.estimated_tokens, 36_500);
    assert_eq!(decision.tier, ProviderTier::HighCapacity);
    assert_eq!(decision.primary_provider, "gemini");
}

#[test]
fn test_vision_step_routes_to_vision_provider() {
    let router = router();
    let step = Step::new("ui", "describe the mockup").with_context(StepContext {
        requires_vision: true,
        ..StepContext::default()
    });

    let decision = router.route(&step, "", &[], ExecutionMode::Balanced).unwrap();

    assert_eq!(decision.tier, ProviderTier::Vision);
    assert_eq!(decision.primary_provider, "gemini_vision");
    assert!(decision.reason.contains("vision required"));
}

#[tokio::test]
async fn test_scheduler_sends_large_context_to_balanced_provider() {
    let groq = MockProvider::new("groq").into_arc();
    let deepseek = MockProvider::new("deepseek").into_arc();
    let loader = InMemoryFileLoader::new().with_file("schema.py", "x".repeat(40_000));
    let scheduler = PlanScheduler::builder(test_config(), registry_with(&[Arc::clone(&groq), Arc::clone(&deepseek)]))
        .with_file_loader(Arc::new(loader))
        .build()
        .unwrap();
    let steps = vec![
        Step::new("small", "rename a variable").with_kind(StepKind::Patch),
        Step::new("large", "generate the ORM layer")
            .with_complexity(0.5)
            .with_estimated_tokens(2_000)
            .with_context_files(["schema.py"]),
    ];

    let result = scheduler.execute(&plan("routing", steps), "").await.unwrap();

    assert!(result.success);
    assert_eq!(groq.unit_ids(), vec!["small"]);
    assert_eq!(deepseek.unit_ids(), vec!["large"]);
    assert_eq!(result.result("large").unwrap().provider.as_deref(), Some("deepseek"));
    assert!(!result.result("large").unwrap().fallback_used);
}

#[tokio::test]
async fn test_fast_mode_keeps_medium_steps_on_fast_tier() {
    let groq = MockProvider::new("groq").into_arc();
    let deepseek = MockProvider::new("deepseek").into_arc();
    let scheduler = PlanScheduler::builder(test_config(), registry_with(&[Arc::clone(&groq), Arc::clone(&deepseek)]))
        .with_execution_mode(ExecutionMode::Fast)
        .build()
        .unwrap();
    // 10_000 * 1.2 * 1.0 * 1.2 + 500 = 14_900
    let steps = vec![Step::new("medium", "write a module")
        .with_complexity(0.0)
        .with_estimated_tokens(10_000)];

    scheduler.execute(&plan("fast", steps), "").await.unwrap();

    assert_eq!(groq.unit_ids(), vec!["medium"]);
    assert_eq!(deepseek.call_count(), 0);
}
