/// Working-tree storage backend.
///
/// Reads and writes the plan document directly under the workspace root:
/// - Atomic writes (write to .tmp, fsync, rename)
/// - Missing document reads as absent, not as an error

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{check_locator, DocumentBackend, StorageError};

/// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
/// Refuses to write empty content over a non-empty file.
pub async fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    if content.trim().is_empty() {
        if let Ok(existing) = tokio::fs::read_to_string(path).await {
            if !existing.trim().is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Refusing to overwrite non-empty file with empty content",
                ));
            }
        }
    }

    let tmp_path = path.with_extension("planboard.tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;

    // fsync directory for rename durability
    if let Some(dir) = path.parent() {
        if let Ok(d) = tokio::fs::File::open(dir).await {
            let _ = d.sync_all().await;
        }
    }
    Ok(())
}

/// Plan storage on the checked-out filesystem.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(check_locator(locator)?))
    }
}

#[async_trait]
impl DocumentBackend for FileBackend {
    async fn read_document(&self, locator: &str) -> Result<Option<String>, StorageError> {
        let path = self.resolve(locator)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, locator: &str, content: &str) -> Result<(), StorageError> {
        let path = self.resolve(locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        atomic_write(&path, content).await?;
        log::debug!(
            "[planboard.storage.file] Wrote {} bytes to {:?}",
            content.len(),
            path
        );
        Ok(())
    }

    fn watch_target(&self, locator: &str) -> Option<PathBuf> {
        self.resolve(locator).ok()
    }

    fn describe(&self) -> String {
        format!("file:{}", self.root.display())
    }
}
