pub mod artifacts;
pub mod git;
pub mod local;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

/// Read/write contract for the plan document.
/// Implementations: FileBackend (working tree), GitBackend (isolated git line).
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Read the document at `locator`. `Ok(None)` when it does not exist.
    async fn read_document(&self, locator: &str) -> Result<Option<String>, StorageError>;

    /// Replace the document at `locator` with `content`.
    async fn write_document(&self, locator: &str, content: &str) -> Result<(), StorageError>;

    /// File whose changes signal that the document changed, if the backend
    /// has one a file watcher can observe.
    fn watch_target(&self, locator: &str) -> Option<PathBuf>;

    /// Short human-readable label for log lines.
    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid document locator: {0}")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Line {0} does not exist")]
    LineMissing(String),

    #[error("Line {line} moved during {attempts} write attempts")]
    RefContention { line: String, attempts: usize },
}

/// Validate a workspace-relative locator: relative, no `..`, not empty.
pub fn check_locator(locator: &str) -> Result<&Path, StorageError> {
    let path = Path::new(locator);
    let valid = !locator.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if valid {
        Ok(path)
    } else {
        Err(StorageError::InvalidLocator(locator.to_string()))
    }
}
