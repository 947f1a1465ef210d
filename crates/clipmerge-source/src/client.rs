//! Jobs API HTTP client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use clipmerge_models::{JobId, MergeJob};

use crate::error::{SourceError, SourceResult};
use crate::payload::MergeBatchPayload;

/// Why a poll produced no work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoJobReason {
    /// The API answered with no clip URLs
    EmptyBatch,
    /// The request never got an HTTP response
    Unreachable(String),
    /// The API answered with a non-success status
    BadStatus(u16),
    /// The response body could not be turned into a job
    Malformed(String),
}

impl NoJobReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoJobReason::EmptyBatch => "empty_batch",
            NoJobReason::Unreachable(_) => "unreachable",
            NoJobReason::BadStatus(_) => "bad_status",
            NoJobReason::Malformed(_) => "malformed",
        }
    }
}

impl fmt::Display for NoJobReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoJobReason::EmptyBatch => write!(f, "no clips to merge"),
            NoJobReason::Unreachable(e) => write!(f, "jobs API unreachable: {}", e),
            NoJobReason::BadStatus(s) => write!(f, "jobs API returned status {}", s),
            NoJobReason::Malformed(e) => write!(f, "malformed jobs API payload: {}", e),
        }
    }
}

impl From<SourceError> for NoJobReason {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::UnexpectedStatus { status, .. } => NoJobReason::BadStatus(status),
            SourceError::Network(e) => match e.status() {
                Some(status) => NoJobReason::BadStatus(status.as_u16()),
                None if e.is_decode() => NoJobReason::Malformed(e.to_string()),
                None => NoJobReason::Unreachable(e.to_string()),
            },
            SourceError::Malformed(msg) => NoJobReason::Malformed(msg),
            SourceError::Json(e) => NoJobReason::Malformed(e.to_string()),
        }
    }
}

/// Result of polling the jobs API.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPoll {
    /// A job with at least one clip URL
    Ready(MergeJob),
    /// Nothing to do right now
    NoJobAvailable(NoJobReason),
}

/// Source of merge jobs and sink for completion reports.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetch the next merge batch. Failures are folded into `NoJobAvailable`.
    async fn fetch_next_job(&self) -> JobPoll;

    /// Report the published URL of a merged artifact.
    async fn report_completion(&self, job_id: &JobId, artifact_url: &str) -> SourceResult<()>;
}

/// Configuration for the jobs API client.
#[derive(Debug, Clone)]
pub struct JobSourceConfig {
    /// GET endpoint returning the next merge batch
    pub fetch_url: String,
    /// PATCH endpoint accepting `id` and `merged_clip` query parameters
    pub report_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl JobSourceConfig {
    pub fn new(fetch_url: impl Into<String>, report_url: impl Into<String>) -> Self {
        Self {
            fetch_url: fetch_url.into(),
            report_url: report_url.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Jobs API client over HTTP.
pub struct HttpJobSource {
    http: Client,
    config: JobSourceConfig,
}

impl HttpJobSource {
    /// Create a new client.
    pub fn new(config: JobSourceConfig) -> SourceResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Fetch and parse the next batch, surfacing every failure.
    pub async fn try_fetch(&self) -> SourceResult<Option<MergeJob>> {
        let response = self
            .http
            .get(&self.config.fetch_url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::unexpected_status(status.as_u16(), body));
        }

        let body = response.bytes().await?;
        debug!(payload = %String::from_utf8_lossy(&body), "Jobs API response");

        let payload: MergeBatchPayload = serde_json::from_slice(&body)?;
        let job = payload.into_job()?;

        if let Some(ref job) = job {
            info!(
                job_id = %job.job_id,
                channel = %job.channel_code,
                "Fetched {} clip URLs: {:?}",
                job.clip_urls.len(),
                job.clip_urls
            );
        }

        Ok(job)
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn fetch_next_job(&self) -> JobPoll {
        match self.try_fetch().await {
            Ok(Some(job)) => JobPoll::Ready(job),
            Ok(None) => JobPoll::NoJobAvailable(NoJobReason::EmptyBatch),
            Err(e) => {
                warn!("Error fetching clips from jobs API: {}", e);
                JobPoll::NoJobAvailable(NoJobReason::from(e))
            }
        }
    }

    async fn report_completion(&self, job_id: &JobId, artifact_url: &str) -> SourceResult<()> {
        let response = self
            .http
            .patch(&self.config.report_url)
            .query(&[("id", job_id.as_str()), ("merged_clip", artifact_url)])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            info!(job_id = %job_id, "Reported merged clip URL: {}", artifact_url);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SourceError::unexpected_status(status.as_u16(), body))
    }
}
