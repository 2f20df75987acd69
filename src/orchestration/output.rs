//! Best-effort persistence of step outputs and run metrics.
//!
//! Sink failures are logged by the scheduler and never fail a plan.

use super::metrics::PlanMetrics;
use crate::models::StepResult;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn persist_step(&self, task_id: &str, result: &StepResult) -> anyhow::Result<()>;

    async fn persist_metrics(&self, task_id: &str, metrics: &PlanMetrics) -> anyhow::Result<()>;

    /// Write the concatenated outputs named by a plan's merge directive
    async fn write_merged(&self, task_id: &str, target_file: &str, content: &str) -> anyhow::Result<()>;
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOutputSink;

#[async_trait]
impl OutputSink for NoopOutputSink {
    async fn persist_step(&self, _task_id: &str, _result: &StepResult) -> anyhow::Result<()> {
        Ok(())
    }

    async fn persist_metrics(&self, _task_id: &str, _metrics: &PlanMetrics) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write_merged(&self, _task_id: &str, _target_file: &str, _content: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes under `<root>/<task_id>/`
///
/// - `steps/<step_id>.json` per step result
/// - `metrics.json` with the running aggregate
/// - `merged/<target_file>` for merge directives
#[derive(Debug, Clone)]
pub struct DirectoryOutputSink {
    root: PathBuf,
}

impl DirectoryOutputSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(file_safe(task_id))
    }

    async fn write(path: &Path, content: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}

#[async_trait]
impl OutputSink for DirectoryOutputSink {
    async fn persist_step(&self, task_id: &str, result: &StepResult) -> anyhow::Result<()> {
        let path = self
            .task_dir(task_id)
            .join("steps")
            .join(format!("{}.json", file_safe(&result.step_id)));
        let body = serde_json::to_vec_pretty(result).context("serializing step result")?;
        Self::write(&path, &body).await
    }

    async fn persist_metrics(&self, task_id: &str, metrics: &PlanMetrics) -> anyhow::Result<()> {
        let path = self.task_dir(task_id).join("metrics.json");
        let body = serde_json::to_vec_pretty(metrics).context("serializing plan metrics")?;
        Self::write(&path, &body).await
    }

    async fn write_merged(&self, task_id: &str, target_file: &str, content: &str) -> anyhow::Result<()> {
        let relative = Path::new(target_file);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("merge target '{target_file}' must be a relative path inside the output directory");
        }
        let path = self.task_dir(task_id).join("merged").join(relative);
        Self::write(&path, content.as_bytes()).await
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_sink_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryOutputSink::new(dir.path());

        sink.persist_step("task-1", &StepResult::success("api::chunk_0", "fn main() {}"))
            .await
            .unwrap();
        sink.persist_metrics("task-1", &PlanMetrics::default()).await.unwrap();
        sink.write_merged("task-1", "out/all.rs", "merged").await.unwrap();

        let task_dir = dir.path().join("task-1");
        let step_json = std::fs::read_to_string(task_dir.join("steps/api__chunk_0.json")).unwrap();
        let parsed: StepResult = serde_json::from_str(&step_json).unwrap();
        assert_eq!(parsed.output, "fn main() {}");
        assert!(task_dir.join("metrics.json").exists());
        assert_eq!(
            std::fs::read_to_string(task_dir.join("merged/out/all.rs")).unwrap(),
            "merged"
        );
    }

    #[tokio::test]
    async fn test_merge_target_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryOutputSink::new(dir.path());
        assert!(sink.write_merged("t", "../escape.rs", "x").await.is_err());
        assert!(sink.write_merged("t", "/abs.rs", "x").await.is_err());
    }
}
