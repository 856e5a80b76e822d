//! Filesystem utilities for transfers.
//!
//! Copies land in a uniquely named temporary file next to the destination
//! and are then persisted over it, so the destination is never seen
//! half-written even when source and destination live on different
//! filesystems.

use std::fs::{self as std_fs, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{WorkerError, WorkerResult};

/// Copy `src` to `dst`, creating the destination directory if needed.
///
/// # Errors
///
/// Returns an error if:
/// - The source file doesn't exist
/// - The destination directory doesn't exist and can't be created
/// - The copy or rename operations fail
pub async fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> WorkerResult<u64> {
    let src = src.as_ref().to_path_buf();
    let dst = dst.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || copy_via_temp(&src, &dst))
        .await
        .map_err(|e| WorkerError::transfer_failed(format!("copy task failed: {e}")))?
}

fn copy_via_temp(src: &Path, dst: &Path) -> WorkerResult<u64> {
    let mut source = File::open(src).map_err(|e| {
        tracing::error!("Failed to open source file: {}: {}", src.display(), e);
        WorkerError::from(e)
    })?;

    let dir: PathBuf = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std_fs::create_dir_all(&dir)?;

    // Dropped, and so removed, on every early return below
    let mut tmp = NamedTempFile::new_in(&dir)?;
    let bytes = io::copy(&mut source, tmp.as_file_mut()).map_err(|e| {
        tracing::error!(
            "Failed to copy file: {} -> {}: {}",
            src.display(),
            tmp.path().display(),
            e
        );
        WorkerError::from(e)
    })?;
    tmp.as_file().sync_all()?;

    tmp.persist(dst).map_err(|e| {
        tracing::error!("Failed to persist temp file to {}: {}", dst.display(), e.error);
        WorkerError::from(e.error)
    })?;

    tracing::debug!(
        "Copied {} bytes: {} -> {}",
        bytes,
        src.display(),
        dst.display()
    );

    Ok(bytes)
}
