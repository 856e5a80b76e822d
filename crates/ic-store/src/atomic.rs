//! Atomic file replacement.
//!
//! Writers stage the full contents in a temporary file next to the target
//! and rename it into place, so a concurrent reader sees either the old
//! file or the new one, never a partial write.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Replace `path` with whatever `write` produces.
///
/// The temporary file is created in the target's directory so the final
/// rename never crosses filesystems. If `write` fails the target is left
/// untouched and the temporary file is removed.
pub fn write_atomic<F>(path: &Path, write: F) -> StoreResult<()>
where
    F: FnOnce(&mut dyn Write) -> StoreResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    debug!(path = %path.display(), "Atomically replaced file");
    Ok(())
}
