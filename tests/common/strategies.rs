//! Proptest strategies for plans

use cascade_core::models::{Step, StepKind};
use proptest::prelude::*;
use proptest::sample::Index;

pub fn step_kind() -> impl Strategy<Value = StepKind> {
    prop_oneof![
        Just(StepKind::CodeGeneration),
        Just(StepKind::Refactoring),
        Just(StepKind::Patch),
        Just(StepKind::Analysis),
        Just(StepKind::Validation),
        Just(StepKind::Review),
    ]
}

/// Acyclic step lists: step `i` may only depend on steps declared before it
pub fn acyclic_steps(max_steps: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        (
            prop::collection::vec(any::<Index>(), 0..4),
            0.0f64..=1.0,
            0u64..20_000,
            step_kind(),
        ),
        1..=max_steps,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (picks, complexity, tokens, kind))| {
                let mut dependencies: Vec<String> = if i == 0 {
                    Vec::new()
                } else {
                    picks.iter().map(|pick| format!("s{}", pick.index(i))).collect()
                };
                dependencies.sort();
                dependencies.dedup();

                Step::new(format!("s{i}"), format!("step number {i}"))
                    .with_kind(kind)
                    .with_complexity(complexity)
                    .with_estimated_tokens(tokens)
                    .with_dependencies(dependencies)
            })
            .collect()
    })
}
