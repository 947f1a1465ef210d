//! Metric names as constants for consistency.

/// Loop iterations, labelled by `outcome`.
pub const ITERATIONS_TOTAL: &str = "clipmerge_iterations_total";
/// Render wall time in seconds.
pub const MERGE_DURATION_SECONDS: &str = "clipmerge_merge_duration_seconds";
/// Clip downloads, labelled by `result`.
pub const CLIP_DOWNLOADS_TOTAL: &str = "clipmerge_clip_downloads_total";
