//! Probe and render seam over the FFmpeg CLI.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use clipmerge_models::EncodingConfig;

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_if_exists;
use crate::probe::{probe_video, VideoInfo};
use crate::render::build_concat_command;
use crate::timeline::Timeline;

/// Loads clip information and renders timelines to disk.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Read duration, frame size and audio presence of a clip.
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;

    /// Render `timeline` into `output`, creating its parent directory.
    async fn render(&self, timeline: &Timeline, output: &Path) -> MediaResult<()>;
}

/// `MediaEngine` backed by the `ffprobe` and `ffmpeg` executables.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    encoding: EncodingConfig,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegEngine {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }

    /// Kill any render that runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Abort renders when the shutdown signal flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new();
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        runner
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        probe_video(path).await
    }

    async fn render(&self, timeline: &Timeline, output: &Path) -> MediaResult<()> {
        if timeline.is_empty() {
            return Err(MediaError::EmptyTimeline);
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = build_concat_command(timeline, output, &self.encoding);
        let total_ms = timeline.duration().as_millis() as i64;

        info!(
            "Rendering {} segments ({:.2}s) to {}",
            timeline.len(),
            timeline.duration().as_secs_f64(),
            output.display()
        );

        let result = self
            .runner()
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    "Encoding progress: {:.1}% (frame {}, speed {:.2}x)",
                    progress.percentage(total_ms),
                    progress.frame,
                    progress.speed
                );
            })
            .await;

        if let Err(e) = result {
            if let Err(cleanup) = remove_file_if_exists(output).await {
                warn!("Failed to remove partial output {}: {}", output.display(), cleanup);
            }
            return Err(e);
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg reported success but wrote no output",
                None,
                None,
            ));
        }

        Ok(())
    }
}
