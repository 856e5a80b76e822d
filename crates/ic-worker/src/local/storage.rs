//! Directory-backed remote storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};
use crate::fs_utils::copy_file;
use crate::providers::RemoteStorage;

/// Remote storage rooted at a local directory.
///
/// Remote paths are `/`-separated and relative to the root; paths that
/// would escape the root are rejected.
#[derive(Debug, Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
}

impl LocalDirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a remote path under the root.
    pub fn resolve(&self, remote_path: &str) -> WorkerResult<PathBuf> {
        let relative = Path::new(remote_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if remote_path.is_empty() || escapes {
            return Err(WorkerError::transfer_failed(format!(
                "invalid remote path '{remote_path}'"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl RemoteStorage for LocalDirStorage {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> WorkerResult<()> {
        let target = self.resolve(remote_path)?;
        let bytes = copy_file(local_path, &target).await?;
        info!(
            local = %local_path.display(),
            remote = remote_path,
            bytes,
            "Uploaded file"
        );
        Ok(())
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> WorkerResult<()> {
        let source = self.resolve(remote_path)?;
        if !source.exists() {
            return Err(WorkerError::transfer_failed(format!(
                "remote file '{remote_path}' does not exist"
            )));
        }
        let bytes = copy_file(&source, local_path).await?;
        info!(
            remote = remote_path,
            local = %local_path.display(),
            bytes,
            "Downloaded file"
        );
        Ok(())
    }
}
