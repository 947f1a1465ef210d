//! References to artifacts published to object storage.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Descriptive metadata attached to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMetadata {
    /// Storage category, also the top-level folder (e.g. "Merge_video")
    pub file_type: String,
    /// Optional sub-folder within the category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    /// When the upload was started
    pub upload_timestamp: DateTime<Utc>,
}

impl PublishMetadata {
    /// Metadata stamped with the current UTC instant.
    pub fn now(file_type: impl Into<String>, segment: Option<String>) -> Self {
        Self {
            file_type: file_type.into(),
            segment,
            upload_timestamp: Utc::now(),
        }
    }

    /// Flatten to the key/value pairs stored on the object.
    ///
    /// An absent segment is omitted rather than stored as an empty value.
    pub fn to_object_metadata(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("file_type".to_string(), self.file_type.clone());
        if let Some(segment) = &self.segment {
            map.insert("segment".to_string(), segment.clone());
        }
        map.insert(
            "timestamp".to_string(),
            self.upload_timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, false),
        );
        map
    }
}

/// Public reference to a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedReference {
    /// Publicly reachable URL of the object
    pub public_url: String,
    /// Object key within the bucket
    pub key: String,
    /// Metadata attached at upload time
    pub metadata: PublishMetadata,
}
