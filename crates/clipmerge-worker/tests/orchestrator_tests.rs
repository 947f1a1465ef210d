//! End-to-end orchestrator tests driven by in-memory fakes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use clipmerge_media::{
    clip_filename, ClipFetcher, MediaEngine, MediaError, MediaResult, Timeline, VideoInfo,
};
use clipmerge_models::{DownloadedClip, JobId, MergeJob, PublishMetadata, PublishedReference};
use clipmerge_source::{JobPoll, JobSource, NoJobReason, SourceError, SourceResult};
use clipmerge_storage::{ArtifactPublisher, StorageError, StorageResult};
use clipmerge_worker::{IterationOutcome, MergeOrchestrator, MergeStage, ScratchContext};

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    polls: Mutex<VecDeque<JobPoll>>,
    reports: Mutex<Vec<(JobId, String)>>,
    fetch_count: Mutex<usize>,
    reject_reports: bool,
    /// Flipped once the queued polls run out
    shutdown_when_drained: Option<watch::Sender<bool>>,
}

impl FakeSource {
    fn with_jobs(jobs: Vec<MergeJob>) -> Self {
        Self {
            polls: Mutex::new(jobs.into_iter().map(JobPoll::Ready).collect()),
            ..Default::default()
        }
    }

    fn reports(&self) -> Vec<(JobId, String)> {
        self.reports.lock().unwrap().clone()
    }

    fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().unwrap()
    }
}

#[async_trait]
impl JobSource for FakeSource {
    async fn fetch_next_job(&self) -> JobPoll {
        *self.fetch_count.lock().unwrap() += 1;
        match self.polls.lock().unwrap().pop_front() {
            Some(poll) => poll,
            None => {
                if let Some(tx) = &self.shutdown_when_drained {
                    let _ = tx.send(true);
                }
                JobPoll::NoJobAvailable(NoJobReason::EmptyBatch)
            }
        }
    }

    async fn report_completion(&self, job_id: &JobId, artifact_url: &str) -> SourceResult<()> {
        self.reports
            .lock()
            .unwrap()
            .push((job_id.clone(), artifact_url.to_string()));
        if self.reject_reports {
            return Err(SourceError::unexpected_status(500, "boom"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeFetcher {
    failing: HashSet<String>,
    requested: Mutex<Vec<String>>,
    /// Flipped once every clip is on disk
    shutdown_after_download: Option<watch::Sender<bool>>,
}

#[async_trait]
impl ClipFetcher for FakeFetcher {
    async fn download_all(&self, urls: &[String], scratch_dir: &Path) -> Vec<DownloadedClip> {
        let mut clips = Vec::new();
        for (i, url) in urls.iter().enumerate() {
            self.requested.lock().unwrap().push(url.clone());
            if self.failing.contains(url) {
                continue;
            }
            let path = scratch_dir.join(clip_filename(url, i));
            std::fs::write(&path, url.as_bytes()).unwrap();
            clips.push(DownloadedClip::new(path, url.clone()));
        }
        if let Some(tx) = &self.shutdown_after_download {
            let _ = tx.send(true);
        }
        clips
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RenderedSegment {
    file: String,
    start: Duration,
    end: Duration,
}

#[derive(Default)]
struct FakeEngine {
    durations: HashMap<String, Duration>,
    fail_render: bool,
    cancel_render: bool,
    panic_on_probe: bool,
    panic_on_render: bool,
    renders: Mutex<Vec<(PathBuf, Vec<RenderedSegment>)>>,
}

impl FakeEngine {
    fn with_durations(durations: &[(&str, Duration)]) -> Self {
        Self {
            durations: durations
                .iter()
                .map(|(name, d)| (name.to_string(), *d))
                .collect(),
            ..Default::default()
        }
    }

    fn renders(&self) -> Vec<(PathBuf, Vec<RenderedSegment>)> {
        self.renders.lock().unwrap().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        if self.panic_on_probe {
            panic!("decoder exploded");
        }
        let duration = self
            .durations
            .get(&file_name(path))
            .copied()
            .ok_or_else(|| MediaError::InvalidVideo(path.display().to_string()))?;
        Ok(VideoInfo {
            duration: duration.as_secs_f64(),
            width: 1280,
            height: 720,
            fps: 25.0,
            codec: "h264".to_string(),
            has_audio: true,
        })
    }

    async fn render(&self, timeline: &Timeline, output: &Path) -> MediaResult<()> {
        let segments = timeline
            .segments()
            .iter()
            .map(|s| RenderedSegment {
                file: file_name(&s.path),
                start: s.start,
                end: s.end,
            })
            .collect();
        self.renders
            .lock()
            .unwrap()
            .push((output.to_path_buf(), segments));

        if self.fail_render {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        if self.cancel_render {
            std::fs::write(output, b"partial").unwrap();
            return Err(MediaError::Cancelled);
        }
        if self.panic_on_render {
            std::fs::write(output, b"partial").unwrap();
            panic!("encoder exploded");
        }
        std::fs::write(output, b"merged").unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct FakePublisher {
    fail: bool,
    published: Mutex<Vec<(String, String, Option<String>)>>,
}

impl FakePublisher {
    fn published(&self) -> Vec<(String, String, Option<String>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactPublisher for FakePublisher {
    async fn publish(
        &self,
        local_path: &Path,
        category: &str,
        segment: Option<&str>,
    ) -> StorageResult<PublishedReference> {
        assert!(local_path.exists(), "artifact must exist when publishing");
        self.published.lock().unwrap().push((
            file_name(local_path),
            category.to_string(),
            segment.map(str::to_string),
        ));
        if self.fail {
            return Err(StorageError::upload_failed("bucket unavailable"));
        }
        let key = format!("{}/{}", category, file_name(local_path));
        Ok(PublishedReference {
            public_url: format!("https://storage.example.com/clips/{}", key),
            key,
            metadata: PublishMetadata::now(category, None),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    source: Arc<FakeSource>,
    fetcher: Arc<FakeFetcher>,
    engine: Arc<FakeEngine>,
    publisher: Arc<FakePublisher>,
    orchestrator: MergeOrchestrator,
    ctx: ScratchContext,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(
        source: FakeSource,
        fetcher: FakeFetcher,
        engine: FakeEngine,
        publisher: FakePublisher,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ScratchContext::new(dir.path().join("single_clip"), dir.path().join("merge_clip"));
        let source = Arc::new(source);
        let fetcher = Arc::new(fetcher);
        let engine = Arc::new(engine);
        let publisher = Arc::new(publisher);
        let orchestrator = MergeOrchestrator::new(
            source.clone(),
            fetcher.clone(),
            engine.clone(),
            publisher.clone(),
        )
        .with_poll_interval(Duration::from_millis(10));

        Self {
            source,
            fetcher,
            engine,
            publisher,
            orchestrator,
            ctx,
            _dir: dir,
        }
    }

    async fn run_once(&self) -> IterationOutcome {
        let (_tx, rx) = watch::channel(false);
        self.orchestrator.run_once(&self.ctx, &rx).await
    }

    fn files_in(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn scratch_files(&self) -> Vec<String> {
        Self::files_in(&self.ctx.scratch_dir)
    }

    fn merge_files(&self) -> Vec<String> {
        Self::files_in(&self.ctx.merge_dir)
    }
}

fn job(urls: &[&str]) -> MergeJob {
    MergeJob {
        job_id: JobId::from_string("42"),
        channel_code: "CH1".to_string(),
        clip_urls: urls.iter().map(|u| u.to_string()).collect(),
        start_trim: secs(2),
        end_trim: secs(3),
        window_start: "2024-01-01T10-05-30.123".to_string(),
        window_end: "2024-01-01T10-07-00.000".to_string(),
    }
}

const URL_A: &str = "https://cdn.example.com/clips/a.mp4";
const URL_B: &str = "https://cdn.example.com/clips/b.mp4";
const URL_C: &str = "https://cdn.example.com/clips/c.mp4";
const OUTPUT: &str = "CH1_10-05-30_10-07-00.mp4";
/// Artifact left behind by an earlier failed upload
const KEPT: &str = "CH1_09-00-00_09-01-30.mp4";

// ---------------------------------------------------------------------------
// Single iterations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_clips_end_to_end() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B])]),
        FakeFetcher::default(),
        FakeEngine::with_durations(&[("a.mp4", secs(10)), ("b.mp4", secs(12))]),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    let expected_url = format!("https://storage.example.com/clips/Merge_video/{}", OUTPUT);
    assert_eq!(
        outcome,
        IterationOutcome::Completed {
            job_id: JobId::from_string("42"),
            public_url: expected_url.clone(),
            reported: true,
        }
    );

    assert_eq!(*h.fetcher.requested.lock().unwrap(), vec![URL_A, URL_B]);

    let renders = h.engine.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].0, h.ctx.merge_dir.join(OUTPUT));
    assert_eq!(
        renders[0].1,
        vec![
            RenderedSegment { file: "a.mp4".into(), start: secs(2), end: secs(10) },
            RenderedSegment { file: "b.mp4".into(), start: secs(0), end: secs(9) },
        ]
    );

    assert_eq!(
        h.publisher.published(),
        vec![(OUTPUT.to_string(), "Merge_video".to_string(), None)]
    );
    assert_eq!(h.source.reports(), vec![(JobId::from_string("42"), expected_url)]);

    assert!(h.scratch_files().is_empty());
    assert!(h.merge_files().is_empty());
}

#[tokio::test]
async fn test_empty_batch_waits_without_work() {
    let h = Harness::new(
        FakeSource::default(),
        FakeFetcher::default(),
        FakeEngine::default(),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert_eq!(outcome, IterationOutcome::Idle(NoJobReason::EmptyBatch));
    assert!(h.fetcher.requested.lock().unwrap().is_empty());
    assert!(h.engine.renders().is_empty());
    assert!(h.publisher.published().is_empty());
    assert!(h.source.reports().is_empty());
}

#[tokio::test]
async fn test_failed_download_leaves_single_clip_policy() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B])]),
        FakeFetcher {
            failing: [URL_B.to_string()].into_iter().collect(),
            ..Default::default()
        },
        FakeEngine::with_durations(&[("a.mp4", secs(10))]),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(outcome, IterationOutcome::Completed { reported: true, .. }));
    let renders = h.engine.renders();
    assert_eq!(
        renders[0].1,
        vec![RenderedSegment { file: "a.mp4".into(), start: secs(2), end: secs(7) }]
    );
}

#[tokio::test]
async fn test_no_downloads_abandons_job() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A])]),
        FakeFetcher {
            failing: [URL_A.to_string()].into_iter().collect(),
            ..Default::default()
        },
        FakeEngine::default(),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(
        outcome,
        IterationOutcome::Abandoned { stage: MergeStage::Downloading, .. }
    ));
    assert!(h.engine.renders().is_empty());
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn test_all_clips_invalid_abandons_and_cleans_up() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A])]),
        FakeFetcher::default(),
        // Shorter than start + end trim
        FakeEngine::with_durations(&[("a.mp4", secs(4))]),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(
        outcome,
        IterationOutcome::Abandoned { stage: MergeStage::Merging, .. }
    ));
    assert!(h.engine.renders().is_empty());
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn test_render_failure_abandons_and_removes_clips() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B])]),
        FakeFetcher::default(),
        FakeEngine {
            fail_render: true,
            ..FakeEngine::with_durations(&[("a.mp4", secs(10)), ("b.mp4", secs(12))])
        },
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(
        outcome,
        IterationOutcome::Abandoned { stage: MergeStage::Encoding, .. }
    ));
    assert!(h.publisher.published().is_empty());
    assert!(h.source.reports().is_empty());
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn test_publish_failure_keeps_artifact_and_skips_report() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A])]),
        FakeFetcher::default(),
        FakeEngine::with_durations(&[("a.mp4", secs(10))]),
        FakePublisher {
            fail: true,
            ..Default::default()
        },
    );

    let outcome = h.run_once().await;

    match outcome {
        IterationOutcome::PublishFailed { job_id, artifact, .. } => {
            assert_eq!(job_id, JobId::from_string("42"));
            assert_eq!(artifact, h.ctx.merge_dir.join(OUTPUT));
            assert!(artifact.exists());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(h.source.reports().is_empty());
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn test_report_failure_still_completes() {
    let h = Harness::new(
        FakeSource {
            reject_reports: true,
            ..FakeSource::with_jobs(vec![job(&[URL_A])])
        },
        FakeFetcher::default(),
        FakeEngine::with_durations(&[("a.mp4", secs(10))]),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(outcome, IterationOutcome::Completed { reported: false, .. }));
    assert_eq!(h.source.reports().len(), 1);
    assert!(h.merge_files().is_empty());
}

#[tokio::test]
async fn test_shutdown_before_poll_is_cancelled() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A])]),
        FakeFetcher::default(),
        FakeEngine::default(),
        FakePublisher::default(),
    );

    let (_tx, rx) = watch::channel(true);
    let outcome = h.orchestrator.run_once(&h.ctx, &rx).await;

    assert_eq!(outcome, IterationOutcome::Cancelled);
    assert_eq!(h.source.fetch_count(), 0);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let h = Harness::new(
        FakeSource::default(),
        FakeFetcher::default(),
        FakeEngine::default(),
        FakePublisher::default(),
    );

    // Directories do not exist yet
    h.orchestrator.cleanup(&h.ctx).await;

    std::fs::create_dir_all(&h.ctx.scratch_dir).unwrap();
    std::fs::create_dir_all(&h.ctx.merge_dir).unwrap();
    std::fs::write(h.ctx.scratch_dir.join("stale.mp4"), b"x").unwrap();
    std::fs::write(h.ctx.merge_dir.join(OUTPUT), b"x").unwrap();

    h.orchestrator.cleanup(&h.ctx).await;
    h.orchestrator.cleanup(&h.ctx).await;

    assert!(h.scratch_files().is_empty());
    assert_eq!(h.merge_files(), vec![OUTPUT.to_string()]);
}

#[tokio::test]
async fn test_unloadable_first_clip_does_not_shift_trims() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B, URL_C])]),
        FakeFetcher::default(),
        // a.mp4 has no known duration and fails to load
        FakeEngine::with_durations(&[("b.mp4", secs(10)), ("c.mp4", secs(10))]),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(outcome, IterationOutcome::Completed { .. }));
    assert_eq!(
        h.engine.renders()[0].1,
        vec![
            RenderedSegment { file: "b.mp4".into(), start: secs(0), end: secs(10) },
            RenderedSegment { file: "c.mp4".into(), start: secs(0), end: secs(7) },
        ]
    );
}

#[tokio::test]
async fn test_unloadable_interior_clip_keeps_outer_trims() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B, URL_C])]),
        FakeFetcher::default(),
        FakeEngine::with_durations(&[("a.mp4", secs(10)), ("c.mp4", secs(10))]),
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert!(matches!(outcome, IterationOutcome::Completed { .. }));
    assert_eq!(
        h.engine.renders()[0].1,
        vec![
            RenderedSegment { file: "a.mp4".into(), start: secs(2), end: secs(10) },
            RenderedSegment { file: "c.mp4".into(), start: secs(0), end: secs(7) },
        ]
    );
}

#[tokio::test]
async fn test_shutdown_after_download_cancels_and_removes_clips() {
    let (tx, rx) = watch::channel(false);
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B])]),
        FakeFetcher {
            shutdown_after_download: Some(tx),
            ..Default::default()
        },
        FakeEngine::with_durations(&[("a.mp4", secs(10)), ("b.mp4", secs(12))]),
        FakePublisher::default(),
    );

    let outcome = h.orchestrator.run_once(&h.ctx, &rx).await;

    assert_eq!(outcome, IterationOutcome::Cancelled);
    assert_eq!(h.fetcher.requested.lock().unwrap().len(), 2);
    assert!(h.engine.renders().is_empty());
    assert!(h.publisher.published().is_empty());
    assert!(h.scratch_files().is_empty());
    assert!(h.merge_files().is_empty());
}

#[tokio::test]
async fn test_cancelled_render_leaves_no_partial_artifact() {
    let h = Harness::new(
        FakeSource::with_jobs(vec![job(&[URL_A, URL_B])]),
        FakeFetcher::default(),
        FakeEngine {
            cancel_render: true,
            ..FakeEngine::with_durations(&[("a.mp4", secs(10)), ("b.mp4", secs(12))])
        },
        FakePublisher::default(),
    );

    let outcome = h.run_once().await;

    assert_eq!(outcome, IterationOutcome::Cancelled);
    assert_eq!(h.engine.renders().len(), 1);
    assert!(h.publisher.published().is_empty());
    assert!(h.source.reports().is_empty());
    assert!(h.scratch_files().is_empty());
    assert!(h.merge_files().is_empty());
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_processes_jobs_until_shutdown() {
    let (tx, rx) = watch::channel(false);
    let mut second = job(&[URL_B]);
    second.job_id = JobId::from_string("43");

    let h = Harness::new(
        FakeSource {
            shutdown_when_drained: Some(tx),
            ..FakeSource::with_jobs(vec![job(&[URL_A]), second])
        },
        FakeFetcher::default(),
        FakeEngine::with_durations(&[("a.mp4", secs(10)), ("b.mp4", secs(10))]),
        FakePublisher::default(),
    );

    tokio::time::timeout(Duration::from_secs(10), h.orchestrator.run(&h.ctx, rx))
        .await
        .expect("loop should stop after shutdown");

    let reported: Vec<_> = h.source.reports().into_iter().map(|(id, _)| id).collect();
    assert_eq!(reported, vec![JobId::from_string("42"), JobId::from_string("43")]);
    assert_eq!(h.engine.renders().len(), 2);
    assert!(h.scratch_files().is_empty());
    assert!(h.merge_files().is_empty());
}

#[tokio::test]
async fn test_run_survives_panicking_iteration() {
    let (tx, rx) = watch::channel(false);

    let h = Harness::new(
        FakeSource {
            shutdown_when_drained: Some(tx),
            ..FakeSource::with_jobs(vec![job(&[URL_A])])
        },
        FakeFetcher::default(),
        FakeEngine {
            panic_on_probe: true,
            ..Default::default()
        },
        FakePublisher::default(),
    );

    tokio::time::timeout(Duration::from_secs(10), h.orchestrator.run(&h.ctx, rx))
        .await
        .expect("loop should keep polling after a panic");

    // One poll that panicked, one that found the queue drained
    assert_eq!(h.source.fetch_count(), 2);
    assert!(h.publisher.published().is_empty());
    assert!(h.scratch_files().is_empty());
}

#[tokio::test]
async fn test_run_keeps_artifact_of_failed_upload_after_shutdown() {
    let (tx, rx) = watch::channel(false);

    let h = Harness::new(
        FakeSource {
            shutdown_when_drained: Some(tx),
            ..FakeSource::with_jobs(vec![job(&[URL_A])])
        },
        FakeFetcher::default(),
        FakeEngine::with_durations(&[("a.mp4", secs(10))]),
        FakePublisher {
            fail: true,
            ..Default::default()
        },
    );

    tokio::time::timeout(Duration::from_secs(10), h.orchestrator.run(&h.ctx, rx))
        .await
        .expect("loop should stop after shutdown");

    assert_eq!(h.publisher.published().len(), 1);
    assert!(h.scratch_files().is_empty());
    assert_eq!(h.merge_files(), vec![OUTPUT.to_string()]);
}

#[tokio::test]
async fn test_panic_during_render_removes_only_its_own_artifact() {
    let (tx, rx) = watch::channel(false);

    let h = Harness::new(
        FakeSource {
            shutdown_when_drained: Some(tx),
            ..FakeSource::with_jobs(vec![job(&[URL_A])])
        },
        FakeFetcher::default(),
        FakeEngine {
            panic_on_render: true,
            ..FakeEngine::with_durations(&[("a.mp4", secs(10))])
        },
        FakePublisher::default(),
    );
    std::fs::create_dir_all(&h.ctx.merge_dir).unwrap();
    std::fs::write(h.ctx.merge_dir.join(KEPT), b"merged").unwrap();

    tokio::time::timeout(Duration::from_secs(10), h.orchestrator.run(&h.ctx, rx))
        .await
        .expect("loop should keep polling after a panic");

    assert_eq!(h.source.fetch_count(), 2);
    assert!(h.publisher.published().is_empty());
    assert!(h.scratch_files().is_empty());
    assert_eq!(h.merge_files(), vec![KEPT.to_string()]);
}
