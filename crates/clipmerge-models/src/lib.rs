//! Shared data models for the clip merge worker.
//!
//! This crate provides:
//! - Merge jobs as fetched from the jobs API
//! - Downloaded clips and rendered artifacts owned by one iteration
//! - Published references returned by object storage
//! - The fixed encoding profile
//! - Deterministic output filename derivation
//! - Metric names shared by the worker crates

pub mod artifact;
pub mod clip;
pub mod encoding;
pub mod job;
pub mod metric_names;
pub mod naming;

pub use artifact::{PublishMetadata, PublishedReference};
pub use clip::{DownloadedClip, MergedArtifact};
pub use encoding::EncodingConfig;
pub use job::{JobId, MergeJob};
pub use naming::{merged_filename, time_of_day_component, NamingError};
