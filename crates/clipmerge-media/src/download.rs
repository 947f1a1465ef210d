//! Clip download over HTTP.
//!
//! Clips are streamed chunk by chunk into the scratch directory so memory use
//! stays bounded regardless of clip size. A failing URL is logged and skipped;
//! it never aborts the batch.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use clipmerge_models::metric_names::CLIP_DOWNLOADS_TOTAL;
use clipmerge_models::DownloadedClip;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_if_exists;

/// Downloads a batch of clip URLs into a local directory.
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    /// Download every URL in order, skipping the ones that fail.
    ///
    /// The result may be shorter than `urls`, or empty.
    async fn download_all(&self, urls: &[String], scratch_dir: &Path) -> Vec<DownloadedClip>;
}

/// Clip fetcher backed by `reqwest`.
pub struct HttpClipFetcher {
    http: Client,
}

impl HttpClipFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::download_failed(format!("HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Stream one URL to `dest`, returning the number of bytes written.
    ///
    /// A partially written file is removed on failure.
    pub async fn download_one(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        match self.stream_to_file(url, dest).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                if let Err(cleanup) = remove_file_if_exists(dest).await {
                    warn!("Failed to remove partial download {}: {}", dest.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| MediaError::download_failed(format!("{}: {}", url, e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl ClipFetcher for HttpClipFetcher {
    async fn download_all(&self, urls: &[String], scratch_dir: &Path) -> Vec<DownloadedClip> {
        let mut clips = Vec::with_capacity(urls.len());
        let mut used_names = HashSet::new();

        for (index, url) in urls.iter().enumerate() {
            let filename = unique_filename(clip_filename(url, index), index, &mut used_names);
            let dest = scratch_dir.join(&filename);

            match self.download_one(url, &dest).await {
                Ok(bytes) => {
                    debug!("Downloaded {} ({} bytes) to {}", url, bytes, dest.display());
                    metrics::counter!(CLIP_DOWNLOADS_TOTAL, "result" => "ok").increment(1);
                    clips.push(DownloadedClip::new(dest, url.clone()));
                }
                Err(e) => {
                    warn!("Error downloading video from {}: {}", url, e);
                    metrics::counter!(CLIP_DOWNLOADS_TOTAL, "result" => "failed").increment(1);
                }
            }
        }

        info!(
            "Downloaded {}/{} clips into {}",
            clips.len(),
            urls.len(),
            scratch_dir.display()
        );
        clips
    }
}

/// Local filename for a clip URL: its final path segment.
///
/// Query string and fragment are ignored. URLs without a usable segment fall
/// back to `clip_<index>.mp4`.
pub fn clip_filename(url: &str, index: usize) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|s| urlencoding::decode(&s).ok().map(|d| d.into_owned()))
        .filter(|s| is_safe_filename(s));

    segment.unwrap_or_else(|| format!("clip_{}.mp4", index))
}

/// Claim `name`, prefixing it with `index` until it no longer collides with
/// a name already handed out in this batch.
fn unique_filename(name: String, index: usize, used: &mut HashSet<String>) -> String {
    let mut candidate = name;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", index, candidate);
    }
    used.insert(candidate.clone());
    candidate
}

fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
