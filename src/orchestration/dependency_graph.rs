//! # Dependency Graph
//!
//! Structural validation and batch layering for plan steps.
//!
//! A batch is the set of not-yet-scheduled steps whose dependencies have all
//! been scheduled in earlier batches. Inside a batch steps are ordered by
//! ascending `(complexity, estimated_tokens)` with a stable sort, so ties keep
//! declaration order and the result is reproducible.

use crate::error::{SchedulerError, StructuralError};
use crate::models::Step;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Steps that may run concurrently
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionBatch {
    pub index: usize,
    pub steps: Vec<Step>,
}

impl ExecutionBatch {
    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Two or more steps of one batch writing the same file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConflict {
    pub file: String,
    pub step_ids: Vec<String>,
}

/// Check ids, complexities, references and acyclicity
pub fn validate_steps(steps: &[Step]) -> Result<(), StructuralError> {
    let mut ids = HashSet::with_capacity(steps.len());
    for step in steps {
        if !ids.insert(step.id.as_str()) {
            return Err(StructuralError::DuplicateStepId {
                step_id: step.id.clone(),
            });
        }
        if !step.complexity.is_finite() || !(0.0..=1.0).contains(&step.complexity) {
            return Err(StructuralError::InvalidComplexity {
                step_id: step.id.clone(),
                complexity: step.complexity,
            });
        }
    }

    for step in steps {
        if let Some(dependency) = step.dependencies.iter().find(|d| !ids.contains(d.as_str())) {
            return Err(StructuralError::DanglingDependency {
                step_id: step.id.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    let unresolved = unresolvable_steps(steps);
    if !unresolved.is_empty() {
        return Err(StructuralError::CyclicDependency { step_ids: unresolved });
    }

    Ok(())
}

/// Steps Kahn's algorithm cannot reach, in declaration order
fn unresolvable_steps(steps: &[Step]) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        let distinct: HashSet<&str> = step.dependencies.iter().map(String::as_str).collect();
        in_degree.insert(step.id.as_str(), distinct.len());
        for dependency in distinct {
            dependents.entry(dependency).or_default().push(step.id.as_str());
        }
    }

    let mut queue: Vec<&str> = steps
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut resolved: HashSet<&str> = HashSet::with_capacity(steps.len());

    while let Some(id) = queue.pop() {
        resolved.insert(id);
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push(dependent);
                }
            }
        }
    }

    steps
        .iter()
        .filter(|s| !resolved.contains(s.id.as_str()))
        .map(|s| s.id.clone())
        .collect()
}

/// Layer steps into dependency-ordered batches
///
/// Expects validated steps. A layer with no ready step while steps remain is
/// reported as an invariant violation.
pub fn compute_batches(steps: &[Step]) -> Result<Vec<ExecutionBatch>, SchedulerError> {
    let mut scheduled: HashSet<&str> = HashSet::with_capacity(steps.len());
    let mut remaining: Vec<&Step> = steps.iter().collect();
    let mut batches = Vec::new();

    while !remaining.is_empty() {
        let (mut ready, blocked): (Vec<&Step>, Vec<&Step>) = remaining
            .into_iter()
            .partition(|step| step.dependencies.iter().all(|d| scheduled.contains(d.as_str())));

        if ready.is_empty() {
            let stuck: Vec<String> = blocked.iter().map(|s| s.id.clone()).collect();
            return Err(SchedulerError::InvariantViolation(format!(
                "no step is ready while {} remain unscheduled: {}",
                stuck.len(),
                stuck.join(", ")
            )));
        }

        ready.sort_by(|a, b| {
            a.complexity
                .total_cmp(&b.complexity)
                .then(a.estimated_tokens.cmp(&b.estimated_tokens))
        });

        for step in &ready {
            scheduled.insert(step.id.as_str());
        }

        let batch = ExecutionBatch {
            index: batches.len(),
            steps: ready.into_iter().cloned().collect(),
        };
        debug!(batch = batch.index, steps = ?batch.step_ids(), "Computed execution batch");
        batches.push(batch);
        remaining = blocked;
    }

    Ok(batches)
}

/// Target files named by more than one step, sorted by file
pub fn detect_file_conflicts(steps: &[Step]) -> Vec<FileConflict> {
    let mut writers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for step in steps {
        for file in step.target_files() {
            writers.entry(file).or_default().push(step.id.clone());
        }
    }

    writers
        .into_iter()
        .filter(|(_, step_ids)| step_ids.len() > 1)
        .map(|(file, step_ids)| FileConflict { file, step_ids })
        .collect()
}
