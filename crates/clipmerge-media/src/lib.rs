#![deny(unreachable_patterns)]
//! Clip download, trimming and concatenation over the FFmpeg CLI.
//!
//! This crate provides:
//! - Scratch directory preparation and idempotent cleanup
//! - Streaming clip downloads that skip failing URLs
//! - Position-based trim policy and timeline assembly
//! - Type-safe FFmpeg command building with cancellation and timeouts
//! - Single-pass concatenation and encoding to the fixed output profile

pub mod command;
pub mod download;
pub mod engine;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod render;
pub mod timeline;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{clip_filename, ClipFetcher, HttpClipFetcher};
pub use engine::{FfmpegEngine, MediaEngine};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{prepare_scratch_dir, remove_file_if_exists, remove_files};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use render::build_concat_command;
pub use timeline::{build_timeline, plan_segment, Timeline, TimelineSegment};
