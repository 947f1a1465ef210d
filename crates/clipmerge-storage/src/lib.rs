//! S3-compatible object storage for merged artifacts.
//!
//! This crate provides:
//! - Credentials and bucket configuration from the environment
//! - Deterministic object keys and public URLs
//! - Uploads with descriptive object metadata

pub mod client;
pub mod error;
pub mod paths;
pub mod publisher;

pub use client::{StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use paths::{blob_path, content_type_for, public_url};
pub use publisher::ArtifactPublisher;
