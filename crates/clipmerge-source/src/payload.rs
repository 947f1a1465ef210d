//! Jobs API payload parsing.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use clipmerge_models::{JobId, MergeJob};

use crate::error::{SourceError, SourceResult};

/// Raw response body of the "get clips for merging" endpoint.
///
/// Every field is optional on the wire; `into_job` decides what a usable
/// batch requires.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeBatchPayload {
    #[serde(default)]
    pub mp4_urls: Option<Vec<String>>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub channel_code: Option<String>,
    #[serde(default)]
    pub clip_start_time: Option<f64>,
    #[serde(default)]
    pub clip_end_time: Option<f64>,
    #[serde(default)]
    pub substory_start_time: Option<String>,
    #[serde(default)]
    pub substory_end_time: Option<String>,
}

impl MergeBatchPayload {
    /// Convert into a merge job.
    ///
    /// Returns `Ok(None)` when the batch carries no URLs. A non-empty batch
    /// missing its id, channel or window timestamps is malformed.
    pub fn into_job(self) -> SourceResult<Option<MergeJob>> {
        let clip_urls: Vec<String> = self
            .mp4_urls
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        if clip_urls.is_empty() {
            return Ok(None);
        }

        let job_id = match self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => JobId::from_string(s),
            Some(Value::Number(n)) => JobId::from_string(n.to_string()),
            other => {
                return Err(SourceError::malformed(format!(
                    "missing or invalid id: {:?}",
                    other
                )))
            }
        };

        let channel_code = self
            .channel_code
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SourceError::malformed("missing channel_code"))?;

        let window_start = self
            .substory_start_time
            .ok_or_else(|| SourceError::malformed("missing substory_start_time"))?;
        let window_end = self
            .substory_end_time
            .ok_or_else(|| SourceError::malformed("missing substory_end_time"))?;

        Ok(Some(MergeJob {
            job_id,
            channel_code,
            clip_urls,
            start_trim: trim_duration("clip_start_time", self.clip_start_time)?,
            end_trim: trim_duration("clip_end_time", self.clip_end_time)?,
            window_start,
            window_end,
        }))
    }
}

/// Decode a trim given in seconds; absent means no trim.
fn trim_duration(field: &str, seconds: Option<f64>) -> SourceResult<Duration> {
    match seconds {
        None => Ok(Duration::ZERO),
        Some(s) if s >= 0.0 => Duration::try_from_secs_f64(s).map_err(|_| {
            SourceError::malformed(format!("{} is out of range: {}", field, s))
        }),
        Some(s) => Err(SourceError::malformed(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, s
        ))),
    }
}
