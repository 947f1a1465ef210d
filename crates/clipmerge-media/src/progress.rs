//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Fold one `key=value` line of `-progress` output into `self`.
    ///
    /// Returns a snapshot when a progress block ends.
    pub fn apply_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            // ffmpeg reports microseconds under this key too
            "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return Some(self.clone());
            }
            _ => {}
        }
        None
    }

    /// Whether a stderr line belongs to `-progress` output rather than a log message.
    pub fn is_progress_line(line: &str) -> bool {
        const KEYS: &[&str] = &[
            "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us",
            "out_time_ms", "out_time", "dup_frames", "drop_frames", "speed", "progress",
        ];
        line.split_once('=')
            .map(|(key, _)| KEYS.contains(&key.trim()))
            .unwrap_or(false)
    }
}
