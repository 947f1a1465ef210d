//! Filter graph for trimming and concatenating a timeline in one encode.

use std::path::Path;

use clipmerge_models::EncodingConfig;

use crate::command::FfmpegCommand;
use crate::timeline::Timeline;

/// Frame size used when the first clip reports none.
const FALLBACK_SIZE: (u32, u32) = (1280, 720);

/// Silent audio source for clips without an audio stream.
const SILENCE_SOURCE: &str = "anullsrc=channel_layout=stereo:sample_rate=44100";

/// Build one FFmpeg command that trims every segment and joins them.
///
/// All segments are scaled and padded to the first segment's frame size and
/// resampled to 44.1 kHz stereo so the concat filter sees uniform streams.
/// Clips without audio are paired with a silent lavfi input.
pub fn build_concat_command(
    timeline: &Timeline,
    output: &Path,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    let (width, height) = target_size(timeline);
    let mut cmd = FfmpegCommand::new(output);

    for segment in timeline.segments() {
        cmd = cmd.input(&segment.path);
    }

    let mut graph = String::new();
    let mut concat_inputs = String::new();
    let mut next_input = timeline.len();

    for (i, segment) in timeline.segments().iter().enumerate() {
        let start = segment.start.as_secs_f64();
        let end = segment.end.as_secs_f64();

        graph.push_str(&format!(
            "[{i}:v]trim=start={start:.3}:end={end:.3},setpts=PTS-STARTPTS,\
             scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}];"
        ));

        if segment.has_audio {
            graph.push_str(&format!(
                "[{i}:a]atrim=start={start:.3}:end={end:.3},asetpts=PTS-STARTPTS,\
                 aformat=sample_rates=44100:channel_layouts=stereo[a{i}];"
            ));
        } else {
            cmd = cmd.lavfi_input(SILENCE_SOURCE, segment.length().as_secs_f64());
            graph.push_str(&format!("[{next_input}:a]asetpts=PTS-STARTPTS[a{i}];"));
            next_input += 1;
        }

        concat_inputs.push_str(&format!("[v{i}][a{i}]"));
    }

    graph.push_str(&format!(
        "{concat_inputs}concat=n={}:v=1:a=1[outv][outa]",
        timeline.len()
    ));

    cmd.filter_complex(graph)
        .map("[outv]")
        .map("[outa]")
        .output_args(encoding.to_ffmpeg_args())
}

/// Frame size of the first segment, rounded down to even dimensions.
fn target_size(timeline: &Timeline) -> (u32, u32) {
    let (w, h) = timeline
        .segments()
        .first()
        .filter(|s| s.width > 0 && s.height > 0)
        .map(|s| (s.width, s.height))
        .unwrap_or(FALLBACK_SIZE);
    ((w & !1).max(2), (h & !1).max(2))
}
