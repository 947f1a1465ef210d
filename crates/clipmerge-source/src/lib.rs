//! Jobs API adapter.
//!
//! This crate provides:
//! - Polling the jobs API for the next merge batch
//! - Parsing and validating the batch payload into a `MergeJob`
//! - Reporting the published artifact URL back to the API

pub mod client;
pub mod error;
pub mod payload;

pub use client::{HttpJobSource, JobPoll, JobSource, JobSourceConfig, NoJobReason};
pub use error::{SourceError, SourceResult};
pub use payload::MergeBatchPayload;
