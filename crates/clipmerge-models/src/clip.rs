//! Local files owned by a single merge iteration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A clip downloaded into the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedClip {
    /// Where the clip was written
    pub local_path: PathBuf,
    /// URL it was fetched from
    pub source_url: String,
}

impl DownloadedClip {
    pub fn new(local_path: impl Into<PathBuf>, source_url: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            source_url: source_url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }
}

/// The rendered, concatenated output of one merge job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedArtifact {
    /// Where the artifact was rendered
    pub local_path: PathBuf,
    /// Filename derived from channel code and window times
    pub derived_filename: String,
}

impl MergedArtifact {
    /// Create an artifact located at `merge_dir/derived_filename`.
    pub fn in_dir(merge_dir: impl AsRef<Path>, derived_filename: impl Into<String>) -> Self {
        let derived_filename = derived_filename.into();
        Self {
            local_path: merge_dir.as_ref().join(&derived_filename),
            derived_filename,
        }
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }
}
