//! Merge job definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::naming::{merged_filename, NamingError};

/// Identifier assigned to a merge job by the jobs API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of merge work: an ordered set of clip URLs plus trim and window metadata.
///
/// A job is immutable once fetched and lives for exactly one orchestrator
/// iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeJob {
    /// Job ID, echoed back when reporting completion
    pub job_id: JobId,
    /// Channel the clips were recorded from
    pub channel_code: String,
    /// Clip URLs in intended playback order
    pub clip_urls: Vec<String>,
    /// Removed from the beginning of the first clip
    pub start_trim: Duration,
    /// Removed from the end of the last clip
    pub end_trim: Duration,
    /// Window start timestamp, as sent by the API
    pub window_start: String,
    /// Window end timestamp, as sent by the API
    pub window_end: String,
}

impl MergeJob {
    /// Whether the job carries any clip URLs at all.
    pub fn has_clips(&self) -> bool {
        !self.clip_urls.is_empty()
    }

    /// Output filename for this job's merged artifact.
    pub fn output_filename(&self, extension: &str) -> Result<String, NamingError> {
        merged_filename(
            &self.channel_code,
            &self.window_start,
            &self.window_end,
            extension,
        )
    }
}
