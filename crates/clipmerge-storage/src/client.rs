//! S3-compatible storage client.

use std::collections::HashMap;
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::paths::public_url;

/// Default endpoint, serving both the S3 interoperability API and public objects.
pub const DEFAULT_ENDPOINT_URL: &str = "https://storage.googleapis.com";

/// Configuration for the storage client.
#[derive(Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" works for most S3-compatible services)
    pub region: String,
    /// Base of public object URLs
    pub public_base_url: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT_URL.to_string()),
            access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("STORAGE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("STORAGE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("STORAGE_BUCKET")
                .map_err(|_| StorageError::config_error("STORAGE_BUCKET not set"))?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT_URL.to_string()),
        })
    }
}

/// Object storage client bound to one bucket.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl StorageClient {
    /// Create a new client from configuration.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        if config.bucket_name.trim().is_empty() {
            return Err(StorageError::config_error("bucket name is empty"));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "clipmerge",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(StorageConfig::from_env()?)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL an object under `key` is served from.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_base_url, &self.bucket, key)
    }

    /// Upload a file with user metadata attached.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        // Surface a missing file as an I/O error rather than an SDK failure
        tokio::fs::metadata(path).await?;

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }
}
