//! # Step Context Assembly
//!
//! Builds the text a step sees: caller context, outputs of completed
//! dependencies and declared reference files. File access goes through the
//! [`FileLoader`] collaborator so the engine never touches the filesystem
//! directly.

use crate::models::{normalize_path, LoadedFile, Step, StepResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const TRUNCATION_MARKER: &str = "\n... [truncated]";

#[derive(Debug, Error)]
pub enum FileLoadError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("path escapes the loader root: {path}")]
    OutsideRoot { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves step-declared paths to content
#[async_trait]
pub trait FileLoader: Send + Sync {
    async fn load(&self, path: &str) -> Result<LoadedFile, FileLoadError>;
}

/// Loader over a fixed set of files
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileLoader {
    files: HashMap<String, String>,
}

impl InMemoryFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<str>, content: impl Into<String>) -> Self {
        self.files.insert(normalize_path(path.as_ref()), content.into());
        self
    }
}

#[async_trait]
impl FileLoader for InMemoryFileLoader {
    async fn load(&self, path: &str) -> Result<LoadedFile, FileLoadError> {
        let key = normalize_path(path);
        self.files
            .get(&key)
            .map(|content| LoadedFile::new(key.clone(), content.clone()))
            .ok_or(FileLoadError::NotFound { path: key })
    }
}

/// Loader reading relative paths under a root directory
///
/// Files larger than `max_file_bytes` are cut at a character boundary and
/// flagged as truncated.
#[derive(Debug, Clone)]
pub struct FsFileLoader {
    root: PathBuf,
    max_file_bytes: usize,
}

impl FsFileLoader {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FileLoadError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(FileLoadError::OutsideRoot { path: path.to_string() });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileLoader for FsFileLoader {
    async fn load(&self, path: &str) -> Result<LoadedFile, FileLoadError> {
        let key = normalize_path(path);
        let full_path = self.resolve(&key)?;

        let content = tokio::fs::read_to_string(&full_path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FileLoadError::NotFound { path: key.clone() }
            } else {
                FileLoadError::Io {
                    path: key.clone(),
                    source,
                }
            }
        })?;

        let (content, truncated) = truncate_to_bytes(content, self.max_file_bytes);
        Ok(LoadedFile {
            path: key,
            content,
            truncated,
        })
    }
}

fn truncate_to_bytes(mut content: String, max_bytes: usize) -> (String, bool) {
    if content.len() <= max_bytes {
        return (content, false);
    }
    let mut cut = max_bytes;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    content.push_str(TRUNCATION_MARKER);
    (content, true)
}

/// Everything a step needs besides its own definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepContextBundle {
    pub context_text: String,
    pub loaded_files: Vec<LoadedFile>,
    /// Dependencies whose result was a failure
    pub failed_dependencies: Vec<String>,
    /// Reference files that could not be loaded or did not fit
    pub skipped_files: Vec<String>,
}

/// Builds [`StepContextBundle`]s
pub struct ContextAssembler {
    loader: Arc<dyn FileLoader>,
    max_total_file_bytes: usize,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("max_total_file_bytes", &self.max_total_file_bytes)
            .finish()
    }
}

impl ContextAssembler {
    pub fn new(loader: Arc<dyn FileLoader>, max_total_file_bytes: usize) -> Self {
        Self {
            loader,
            max_total_file_bytes,
        }
    }

    /// Assemble context for a step
    ///
    /// Successful dependency outputs are included in dependency order; a
    /// failed dependency contributes a single marker line.
    pub async fn assemble(
        &self,
        step: &Step,
        caller_context: &str,
        completed: &HashMap<String, StepResult>,
    ) -> StepContextBundle {
        let mut bundle = StepContextBundle::default();
        let mut sections = Vec::new();

        if !caller_context.trim().is_empty() {
            sections.push(caller_context.trim_end().to_string());
        }

        for dependency in &step.dependencies {
            match completed.get(dependency) {
                Some(result) if result.success => {
                    sections.push(format!("## Output of step `{dependency}`\n{}", result.output.trim_end()));
                }
                Some(result) => {
                    sections.push(format!(
                        "## Step `{dependency}` failed and produced no output ({})",
                        result.error_message()
                    ));
                    bundle.failed_dependencies.push(dependency.clone());
                }
                None => {
                    debug!(step_id = %step.id, dependency = %dependency, "Dependency result not available");
                }
            }
        }

        bundle.context_text = sections.join("\n\n");
        self.load_reference_files(step, &mut bundle).await;
        bundle
    }

    async fn load_reference_files(&self, step: &Step, bundle: &mut StepContextBundle) {
        let mut remaining = self.max_total_file_bytes;

        for path in &step.context.context_files {
            if remaining == 0 {
                warn!(step_id = %step.id, path = %path, "Context file budget exhausted, skipping file");
                bundle.skipped_files.push(normalize_path(path));
                continue;
            }

            match self.loader.load(path).await {
                Ok(file) => {
                    let (content, cut) = truncate_to_bytes(file.content, remaining);
                    remaining = remaining.saturating_sub(content.len());
                    bundle.loaded_files.push(LoadedFile {
                        path: file.path,
                        content,
                        truncated: file.truncated || cut,
                    });
                }
                Err(e) => {
                    warn!(step_id = %step.id, path = %path, error = %e, "Failed to load context file");
                    bundle.skipped_files.push(normalize_path(path));
                }
            }
        }
    }
}
