//! Scratch and merge directory housekeeping.
//!
//! Every helper here is safe to call repeatedly: files that are already gone
//! are not an error.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Ensure `dir` exists and holds no files.
///
/// Removes every regular file directly inside `dir`. Subdirectories are left
/// untouched.
pub async fn prepare_scratch_dir(dir: impl AsRef<Path>) -> MediaResult<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).await?;

    let mut entries = fs::read_dir(dir).await?;
    let mut removed = 0usize;

    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            continue;
        }
        if remove_file_if_exists(entry.path()).await? {
            removed += 1;
        }
    }

    if removed > 0 {
        debug!("Removed {} stale files from {}", removed, dir.display());
    }

    Ok(())
}

/// Remove a file, treating "not found" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove every listed file, logging failures instead of returning them.
///
/// Returns the number of files removed.
pub async fn remove_files<I, P>(paths: I) -> usize
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut removed = 0usize;
    for path in paths {
        let path = path.into();
        match remove_file_if_exists(&path).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}
