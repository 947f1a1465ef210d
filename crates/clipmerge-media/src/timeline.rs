//! Trim policy and timeline assembly.
//!
//! Clips are joined in the order they were downloaded. The job's start trim
//! applies only to the first clip and its end trim only to the last; a single
//! clip receives both. Interior clips are used whole.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use clipmerge_models::DownloadedClip;

use crate::engine::MediaEngine;
use crate::error::{MediaError, MediaResult};

/// One trimmed clip within a timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSegment {
    /// Downloaded clip file
    pub path: PathBuf,
    /// URL the clip came from
    pub source_url: String,
    /// Offset into the clip where the segment starts
    pub start: Duration,
    /// Offset into the clip where the segment ends
    pub end: Duration,
    /// Frame size of the clip, when known
    pub width: u32,
    pub height: u32,
    /// Whether the clip carries audio
    pub has_audio: bool,
}

impl TimelineSegment {
    /// Length of the segment after trimming.
    pub fn length(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Ordered sequence of trimmed clips forming one output stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    segments: Vec<TimelineSegment>,
}

impl Timeline {
    pub fn new(segments: Vec<TimelineSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[TimelineSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total output duration.
    pub fn duration(&self) -> Duration {
        self.segments.iter().map(TimelineSegment::length).sum()
    }
}

/// Compute the `(start, end)` window of clip `index` out of `count`.
///
/// Fails when the trims leave the clip with no content.
pub fn plan_segment(
    index: usize,
    count: usize,
    duration: Duration,
    start_trim: Duration,
    end_trim: Duration,
) -> MediaResult<(Duration, Duration)> {
    let is_first = index == 0;
    let is_last = index + 1 == count;

    let start = if is_first { start_trim } else { Duration::ZERO };
    let trailing = if is_last { end_trim } else { Duration::ZERO };

    let invalid = || MediaError::InvalidTrim {
        start,
        end: trailing,
        duration,
    };

    let end = duration.checked_sub(trailing).ok_or_else(invalid)?;
    if start >= end {
        return Err(invalid());
    }

    Ok((start, end))
}

/// Probe every downloaded clip and build the trimmed timeline.
///
/// Clips that fail to probe or whose trim leaves nothing are logged and left
/// out. Trim positions follow the downloaded order, so a dropped clip never
/// shifts a trim onto its neighbour. Returns `EmptyTimeline` when nothing
/// survives.
pub async fn build_timeline(
    engine: &dyn MediaEngine,
    clips: &[DownloadedClip],
    start_trim: Duration,
    end_trim: Duration,
) -> MediaResult<Timeline> {
    let count = clips.len();
    let mut segments = Vec::with_capacity(count);

    for (index, clip) in clips.iter().enumerate() {
        let info = match engine.probe(clip.path()).await {
            Ok(info) => info,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Error processing video file {}: {}", clip.path().display(), e);
                continue;
            }
        };

        let planned = info
            .duration()
            .and_then(|duration| plan_segment(index, count, duration, start_trim, end_trim));

        match planned {
            Ok((start, end)) => segments.push(TimelineSegment {
                path: clip.local_path.clone(),
                source_url: clip.source_url.clone(),
                start,
                end,
                width: info.width,
                height: info.height,
                has_audio: info.has_audio,
            }),
            Err(e) => {
                warn!("Excluding {} from merge: {}", clip.path().display(), e);
            }
        }
    }

    if segments.is_empty() {
        return Err(MediaError::EmptyTimeline);
    }

    let timeline = Timeline::new(segments);
    info!(
        "Built timeline of {}/{} clips, {:.2}s total",
        timeline.len(),
        count,
        timeline.duration().as_secs_f64()
    );
    Ok(timeline)
}
