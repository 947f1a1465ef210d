//! Object key, content type and public URL derivation.

use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Object key for a local file: `<category>/<segment>/<basename>` when a
/// segment is given, `<category>/<basename>` otherwise.
///
/// An empty segment counts as no segment.
pub fn blob_path(local_path: &Path, category: &str, segment: Option<&str>) -> StorageResult<String> {
    let basename = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            StorageError::invalid_key(format!("no usable file name in {}", local_path.display()))
        })?;

    let category = category.trim_matches('/');
    if category.is_empty() {
        return Err(StorageError::invalid_key("empty category"));
    }

    match segment.map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()) {
        Some(segment) => Ok(format!("{}/{}/{}", category, segment, basename)),
        None => Ok(format!("{}/{}", category, basename)),
    }
}

/// MIME type for an artifact, from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

/// Public URL of `key` in `bucket`: `<base>/<bucket>/<key>` with each key
/// segment percent-encoded and `/` kept literal.
pub fn public_url(base_url: &str, bucket: &str, key: &str) -> String {
    let encoded_key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(bucket),
        encoded_key
    )
}
