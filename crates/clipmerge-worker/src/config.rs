//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// GET endpoint returning the next merge batch
    pub job_source_url: String,
    /// PATCH endpoint receiving the merged clip URL
    pub report_url: String,
    /// Directory clips are downloaded into
    pub scratch_dir: PathBuf,
    /// Directory merged artifacts are written to
    pub merge_dir: PathBuf,
    /// Pause between iterations
    pub poll_interval: Duration,
    /// Timeout for jobs API requests and clip downloads
    pub http_timeout: Duration,
    /// Longest a single render may run
    pub ffmpeg_timeout: Duration,
    /// Storage folder merged artifacts are published under
    pub publish_category: String,
    /// Port for the Prometheus exporter, if enabled
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_source_url: String::new(),
            report_url: String::new(),
            scratch_dir: PathBuf::from("single_clip"),
            merge_dir: PathBuf::from("merge_clip"),
            poll_interval: Duration::from_secs(10),
            http_timeout: Duration::from_secs(300),
            ffmpeg_timeout: Duration::from_secs(3600), // 1 hour
            publish_category: "Merge_video".to_string(),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// `JOB_SOURCE_URL` and `REPORT_URL` are required.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            job_source_url: required("JOB_SOURCE_URL")?,
            report_url: required("REPORT_URL")?,
            scratch_dir: std::env::var("WORKER_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            merge_dir: std::env::var("WORKER_MERGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.merge_dir),
            poll_interval: std::env::var("WORKER_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            http_timeout: std::env::var("WORKER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            ffmpeg_timeout: std::env::var("WORKER_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            publish_category: std::env::var("WORKER_PUBLISH_CATEGORY")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.publish_category),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        })
    }
}

fn required(key: &str) -> WorkerResult<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| WorkerError::config_error(format!("{} not set", key)))
}
