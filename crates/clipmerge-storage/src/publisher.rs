//! Artifact publishing.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use clipmerge_models::{PublishMetadata, PublishedReference};

use crate::client::StorageClient;
use crate::error::StorageResult;
use crate::paths::{blob_path, content_type_for};

/// Uploads a local artifact and returns where it can be fetched publicly.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Upload `local_path` under `category` (and `segment`, when given).
    async fn publish(
        &self,
        local_path: &Path,
        category: &str,
        segment: Option<&str>,
    ) -> StorageResult<PublishedReference>;
}

#[async_trait]
impl ArtifactPublisher for StorageClient {
    async fn publish(
        &self,
        local_path: &Path,
        category: &str,
        segment: Option<&str>,
    ) -> StorageResult<PublishedReference> {
        let segment = segment.filter(|s| !s.is_empty());
        let key = blob_path(local_path, category, segment)?;
        let metadata = PublishMetadata::now(category, segment.map(str::to_string));

        self.upload_file(
            local_path,
            &key,
            content_type_for(local_path),
            metadata.to_object_metadata(),
        )
        .await?;

        let public_url = self.public_url(&key);
        info!(key = %key, url = %public_url, "Published artifact");

        Ok(PublishedReference {
            public_url,
            key,
            metadata,
        })
    }
}
