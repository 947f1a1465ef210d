//! Merge orchestrator: the poll, merge, publish and report loop.
//!
//! One job is processed at a time. Each iteration walks
//! `Polling → Downloading → Merging → Encoding → Publishing → Reporting →
//! Cleanup` and then waits for the poll interval. Any step without usable
//! work ends the iteration early; none of them stops the loop.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use clipmerge_media::{
    build_timeline, prepare_scratch_dir, remove_file_if_exists, remove_files, ClipFetcher,
    MediaEngine,
};
use clipmerge_models::{EncodingConfig, JobId, MergeJob, MergedArtifact};
use clipmerge_source::{JobPoll, JobSource, NoJobReason};
use clipmerge_storage::ArtifactPublisher;

use crate::config::WorkerConfig;
use crate::logging::JobLogger;
use crate::metrics::{record_iteration, record_merge_duration};

/// Pipeline stage an iteration was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Polling,
    Downloading,
    Merging,
    Encoding,
    Publishing,
    Reporting,
    Cleanup,
}

impl MergeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStage::Polling => "polling",
            MergeStage::Downloading => "downloading",
            MergeStage::Merging => "merging",
            MergeStage::Encoding => "encoding",
            MergeStage::Publishing => "publishing",
            MergeStage::Reporting => "reporting",
            MergeStage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one iteration ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// No usable job was available
    Idle(NoJobReason),
    /// The job was dropped before an artifact was produced
    Abandoned {
        job_id: JobId,
        stage: MergeStage,
        reason: String,
    },
    /// The artifact was rendered but could not be uploaded; it stays on disk
    PublishFailed {
        job_id: JobId,
        artifact: PathBuf,
        reason: String,
    },
    /// The artifact was published; `reported` tells whether the API accepted it
    Completed {
        job_id: JobId,
        public_url: String,
        reported: bool,
    },
    /// Shutdown was requested mid-iteration
    Cancelled,
    /// The iteration panicked; the loop carried on
    Panicked(String),
}

impl IterationOutcome {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            IterationOutcome::Idle(_) => "idle",
            IterationOutcome::Abandoned { .. } => "abandoned",
            IterationOutcome::PublishFailed { .. } => "publish_failed",
            IterationOutcome::Completed { .. } => "completed",
            IterationOutcome::Cancelled => "cancelled",
            IterationOutcome::Panicked(_) => "panicked",
        }
    }
}

/// Local directories one iteration works in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchContext {
    /// Downloaded clips; cleared at the start of every job
    pub scratch_dir: PathBuf,
    /// Rendered artifacts awaiting upload
    pub merge_dir: PathBuf,
}

impl ScratchContext {
    pub fn new(scratch_dir: impl Into<PathBuf>, merge_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            merge_dir: merge_dir.into(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.scratch_dir, &config.merge_dir)
    }
}

/// Drives jobs from the source through download, merge and publish.
pub struct MergeOrchestrator {
    source: Arc<dyn JobSource>,
    fetcher: Arc<dyn ClipFetcher>,
    engine: Arc<dyn MediaEngine>,
    publisher: Arc<dyn ArtifactPublisher>,
    poll_interval: Duration,
    publish_category: String,
    output_extension: String,
    /// Artifact the current iteration is rendering or publishing
    in_flight: Mutex<Option<PathBuf>>,
}

impl MergeOrchestrator {
    pub fn new(
        source: Arc<dyn JobSource>,
        fetcher: Arc<dyn ClipFetcher>,
        engine: Arc<dyn MediaEngine>,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> Self {
        let defaults = WorkerConfig::default();
        Self {
            source,
            fetcher,
            engine,
            publisher,
            poll_interval: defaults.poll_interval,
            publish_category: defaults.publish_category,
            output_extension: EncodingConfig::default().container_extension,
            in_flight: Mutex::new(None),
        }
    }

    /// Apply interval and category from `config`.
    pub fn with_config(mut self, config: &WorkerConfig) -> Self {
        self.poll_interval = config.poll_interval;
        self.publish_category = config.publish_category.clone();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run iterations until `shutdown` flips to `true`.
    ///
    /// The wait between iterations is interrupted by shutdown. The scratch
    /// directory is cleared on the way out; artifacts kept by earlier failed
    /// uploads stay in the merge directory.
    pub async fn run(&self, ctx: &ScratchContext, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Merge loop started (poll interval {}s, category {})",
            self.poll_interval.as_secs_f64(),
            self.publish_category
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = match AssertUnwindSafe(self.run_once(ctx, &shutdown))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!("Merge iteration panicked: {}", reason);
                    self.cleanup(ctx).await;
                    IterationOutcome::Panicked(reason)
                }
            };

            record_iteration(&outcome);
            debug!("Iteration outcome: {:?}", outcome);

            if outcome == IterationOutcome::Cancelled {
                break;
            }

            if wait_or_shutdown(&mut shutdown, self.poll_interval).await {
                break;
            }
        }

        info!("Shutdown signal received, stopping merge loop");
        self.cleanup(ctx).await;
    }

    /// Run exactly one iteration.
    pub async fn run_once(
        &self,
        ctx: &ScratchContext,
        shutdown: &watch::Receiver<bool>,
    ) -> IterationOutcome {
        if *shutdown.borrow() {
            return IterationOutcome::Cancelled;
        }

        let job = match self.source.fetch_next_job().await {
            JobPoll::Ready(job) => job,
            JobPoll::NoJobAvailable(reason) => {
                match &reason {
                    NoJobReason::EmptyBatch => info!("No clips to merge, waiting"),
                    other => info!("No job available ({}), waiting", other),
                }
                return IterationOutcome::Idle(reason);
            }
        };

        let logger = JobLogger::new(&job.job_id, "merge");
        let span = logger.create_span();
        self.process_job(ctx, job, &logger, shutdown)
            .instrument(span)
            .await
    }

    async fn process_job(
        &self,
        ctx: &ScratchContext,
        job: MergeJob,
        logger: &JobLogger,
        shutdown: &watch::Receiver<bool>,
    ) -> IterationOutcome {
        let job_id = job.job_id.clone();
        let abandon = |stage: MergeStage, reason: String| {
            logger.log_error(stage.as_str(), &reason);
            IterationOutcome::Abandoned {
                job_id: job_id.clone(),
                stage,
                reason,
            }
        };

        logger.log_start(&format!(
            "{} clips for channel {} ({} to {})",
            job.clip_urls.len(),
            job.channel_code,
            job.window_start,
            job.window_end
        ));

        if *shutdown.borrow() {
            return IterationOutcome::Cancelled;
        }

        // Downloading
        logger.log_stage(MergeStage::Downloading.as_str(), "clearing scratch directory");
        if let Err(e) = prepare_scratch_dir(&ctx.scratch_dir).await {
            return abandon(MergeStage::Downloading, e.to_string());
        }

        let clips = self
            .fetcher
            .download_all(&job.clip_urls, &ctx.scratch_dir)
            .await;
        let clip_paths: Vec<PathBuf> = clips.iter().map(|c| c.local_path.clone()).collect();

        if clips.is_empty() {
            return abandon(
                MergeStage::Downloading,
                format!("none of {} clips could be downloaded", job.clip_urls.len()),
            );
        }
        if clips.len() < job.clip_urls.len() {
            logger.log_warning(
                MergeStage::Downloading.as_str(),
                &format!("only {}/{} clips downloaded", clips.len(), job.clip_urls.len()),
            );
        }

        if *shutdown.borrow() {
            remove_files(&clip_paths).await;
            return IterationOutcome::Cancelled;
        }

        // Merging
        logger.log_stage(MergeStage::Merging.as_str(), "trimming clips");
        let timeline =
            match build_timeline(self.engine.as_ref(), &clips, job.start_trim, job.end_trim).await {
                Ok(timeline) => timeline,
                Err(e) => {
                    remove_files(&clip_paths).await;
                    if e.is_cancelled() {
                        return IterationOutcome::Cancelled;
                    }
                    return abandon(MergeStage::Merging, e.to_string());
                }
            };

        let filename = match job.output_filename(&self.output_extension) {
            Ok(name) => name,
            Err(e) => {
                remove_files(&clip_paths).await;
                return abandon(MergeStage::Encoding, e.to_string());
            }
        };
        let artifact = MergedArtifact::in_dir(&ctx.merge_dir, filename);

        if *shutdown.borrow() {
            remove_files(&clip_paths).await;
            return IterationOutcome::Cancelled;
        }

        // Encoding
        logger.log_stage(
            MergeStage::Encoding.as_str(),
            &format!("rendering {}", artifact.path().display()),
        );
        self.track_artifact(artifact.path());
        let started = Instant::now();
        let rendered = self.engine.render(&timeline, artifact.path()).await;
        drop(timeline);
        remove_files(&clip_paths).await;

        if let Err(e) = rendered {
            self.discard_in_flight().await;
            if e.is_cancelled() {
                return IterationOutcome::Cancelled;
            }
            return abandon(MergeStage::Encoding, e.to_string());
        }
        record_merge_duration(started.elapsed().as_secs_f64());

        if *shutdown.borrow() {
            self.discard_in_flight().await;
            return IterationOutcome::Cancelled;
        }

        // Publishing
        logger.log_stage(MergeStage::Publishing.as_str(), &artifact.derived_filename);
        let reference = match self
            .publisher
            .publish(artifact.path(), &self.publish_category, None)
            .await
        {
            Ok(reference) => reference,
            Err(e) => {
                let reason = e.to_string();
                logger.log_error(MergeStage::Publishing.as_str(), &reason);
                // Left on disk for a later upload
                self.lock_in_flight().take();
                return IterationOutcome::PublishFailed {
                    job_id,
                    artifact: artifact.local_path,
                    reason,
                };
            }
        };

        // Reporting
        logger.log_stage(MergeStage::Reporting.as_str(), &reference.public_url);
        let reported = match self
            .source
            .report_completion(&job.job_id, &reference.public_url)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                logger.log_warning(
                    MergeStage::Reporting.as_str(),
                    &format!("failed to update merged clip status: {}", e),
                );
                false
            }
        };

        // Cleanup
        self.discard_in_flight().await;
        logger.log_completion(&reference.public_url);

        IterationOutcome::Completed {
            job_id,
            public_url: reference.public_url,
            reported,
        }
    }

    /// Remove the clips left in the scratch directory and the artifact of
    /// an interrupted iteration.
    ///
    /// Other files in the merge directory are left alone. Missing directories
    /// are fine; calling this twice is harmless.
    pub async fn cleanup(&self, ctx: &ScratchContext) {
        let removed = remove_files(list_files(&ctx.scratch_dir).await).await;
        if removed > 0 {
            debug!("Removed {} files from {}", removed, ctx.scratch_dir.display());
        }
        self.discard_in_flight().await;
    }

    fn track_artifact(&self, path: &Path) {
        *self.lock_in_flight() = Some(path.to_path_buf());
    }

    /// Delete the tracked artifact, if any, and stop tracking it.
    async fn discard_in_flight(&self) {
        let in_flight = self.lock_in_flight().take();
        if let Some(path) = in_flight {
            discard_artifact(&path).await;
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<PathBuf>> {
        // A panicking iteration never holds the lock across an await
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn discard_artifact(path: &Path) {
    if let Err(e) = remove_file_if_exists(path).await {
        warn!(stage = MergeStage::Cleanup.as_str(), "Failed to remove {}: {}", path.display(), e);
    }
}

/// Regular files directly inside `dir`; empty when it cannot be read.
async fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    files
}

/// Sleep for `interval`; returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    let signalled = async {
        loop {
            if *shutdown.borrow_and_update() {
                return;
            }
            if shutdown.changed().await.is_err() {
                // Sender gone; nobody can request shutdown any more
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = signalled => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
