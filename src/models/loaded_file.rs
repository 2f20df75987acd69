use serde::{Deserialize, Serialize};

/// A file whose content was loaded for a step's context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedFile {
    pub path: String,
    pub content: String,
    /// Whether the content was cut at a byte cap
    #[serde(default)]
    pub truncated: bool,
}

impl LoadedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            truncated: false,
        }
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}
