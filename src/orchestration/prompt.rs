use super::context::StepContextBundle;
use crate::models::{Step, StepKind};
use std::fmt::Write;

/// Prompt submitted for a step or chunk sub-step
///
/// `prior_outputs` carries outputs of predecessor chunks, in order.
pub fn build_prompt(step: &Step, bundle: &StepContextBundle, prior_outputs: &[(&str, &str)]) -> String {
    let mut prompt = String::with_capacity(step.description.len() + bundle.context_text.len() + 256);

    let _ = writeln!(prompt, "# Task ({})", step.kind);
    let _ = writeln!(prompt, "{}", step.description.trim());
    let _ = writeln!(prompt, "\n{}", kind_instruction(step.kind));

    let targets = step.target_files();
    if !targets.is_empty() {
        let _ = writeln!(prompt, "\n## Target files");
        for file in &targets {
            let _ = writeln!(prompt, "- {file}");
        }
    }

    if step.context.surgical_mode {
        let _ = writeln!(
            prompt,
            "\nApply minimal, surgical edits. Do not rewrite code unrelated to the task."
        );
    }
    if step.context.pre_reasoning {
        let _ = writeln!(prompt, "\nOutline your approach briefly before writing code.");
    }

    if !step.validation_criteria.is_empty() {
        let _ = writeln!(prompt, "\n## Validation criteria");
        for criterion in &step.validation_criteria {
            let _ = writeln!(prompt, "- {criterion}");
        }
    }

    if !bundle.context_text.is_empty() {
        let _ = writeln!(prompt, "\n## Context\n{}", bundle.context_text);
    }

    for file in &bundle.loaded_files {
        let marker = if file.truncated { " (truncated)" } else { "" };
        let _ = writeln!(prompt, "\n## Reference: {}{marker}\n```\n{}\n```", file.path, file.content);
    }

    for (chunk_id, output) in prior_outputs {
        let _ = writeln!(prompt, "\n## Previous part `{chunk_id}`\n{}", output.trim_end());
    }

    prompt
}

fn kind_instruction(kind: StepKind) -> &'static str {
    match kind {
        StepKind::CodeGeneration => "Write complete, working code.",
        StepKind::Refactoring => "Restructure the code without changing its behaviour.",
        StepKind::Patch => "Produce the smallest change that fixes the problem.",
        StepKind::Analysis => "Analyse the code and report findings; do not modify it.",
        StepKind::Validation => "Check the work against the criteria and report any violation.",
        StepKind::Review => "Review the code and list concrete issues with suggested fixes.",
    }
}
