//! Blob (file) storage for screenshots and uploaded images.
//!
//! Provides the [`BlobStore`] trait, [`storage_path`] for turning a stored public URL
//! into a bucket-relative path, and two backends created via [`create_blob_store`]:
//! [`local::LocalBlobStore`] (bucket is a directory) and [`http::HttpBlobStore`]
//! (object-storage REST API).

pub mod http;
pub mod local;

use anyhow::Result;

use crate::config::BlobConfig;

/// Per-file storage error. Callers collect these rather than aborting.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage request failed with HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("storage request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// An entry returned by [`BlobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Name relative to the listed prefix (no slashes).
    pub name: String,
    pub is_folder: bool,
}

/// Trait for bucket-scoped file storage. All paths are relative to the bucket.
///
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait BlobStore: Send + Sync {
    /// Remove one object. Removing an object that does not exist is not an error.
    fn remove(&self, path: &str) -> Result<(), BlobError>;

    /// Copy `from` to `to`. Fails with [`BlobError::AlreadyExists`] if `to` exists.
    fn copy(&self, from: &str, to: &str) -> Result<(), BlobError>;

    /// Store `bytes` at `path`. Fails with [`BlobError::AlreadyExists`] if `path` exists.
    fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError>;

    /// List the immediate children of `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError>;

    /// Read one object. Fails with [`BlobError::NotFound`] if it does not exist.
    fn download(&self, path: &str) -> Result<Vec<u8>, BlobError>;
}

/// Derive a bucket-relative storage path from a stored URL: everything after the
/// first `/<bucket>/` segment. Returns `None` if the segment is missing or nothing
/// follows it.
pub fn storage_path<'u>(url: &'u str, bucket: &str) -> Option<&'u str> {
    let marker = format!("/{bucket}/");
    url.split_once(marker.as_str())
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}

/// Recursively collect every file path under `folder`.
pub fn list_files_recursive(store: &dyn BlobStore, folder: &str) -> Result<Vec<String>, BlobError> {
    let mut paths = Vec::new();
    for entry in store.list(folder)? {
        let path = format!("{folder}/{}", entry.name);
        if entry.is_folder {
            paths.extend(list_files_recursive(store, &path)?);
        } else {
            paths.push(path);
        }
    }
    Ok(paths)
}

/// Create a blob store from config.
///
/// Supported backends: `"local"` and `"http"`.
pub fn create_blob_store(
    config: &BlobConfig,
    local_root: std::path::PathBuf,
) -> Result<Box<dyn BlobStore>> {
    match config.backend.as_str() {
        "local" => Ok(Box::new(local::LocalBlobStore::new(local_root)?)),
        "http" => {
            anyhow::ensure!(
                !config.base_url.is_empty(),
                "blobs.base_url must be set for the http backend"
            );
            Ok(Box::new(http::HttpBlobStore::new(
                &config.base_url,
                &config.bucket,
                &config.service_key,
            )?))
        }
        other => anyhow::bail!("unknown blob backend: {other}. Supported: local, http"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_strips_through_bucket_segment() {
        let url = "https://abc.example.co/storage/v1/object/public/screenshots/poi_screenshots/1_a.png";
        assert_eq!(
            storage_path(url, "screenshots"),
            Some("poi_screenshots/1_a.png")
        );
    }

    #[test]
    fn storage_path_uses_first_segment() {
        let url = "https://x/storage/v1/object/public/screenshots/nested/screenshots/f.png";
        assert_eq!(storage_path(url, "screenshots"), Some("nested/screenshots/f.png"));
    }

    #[test]
    fn storage_path_without_bucket_is_none() {
        assert_eq!(storage_path("test/original1.jpg", "screenshots"), None);
        assert_eq!(storage_path("https://x/public/screenshots/", "screenshots"), None);
        assert_eq!(storage_path("https://x/screenshotsfoo/a.png", "screenshots"), None);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = BlobConfig {
            backend: "ftp".into(),
            ..BlobConfig::default()
        };
        let tmp = tempfile::TempDir::new().unwrap();
        let err = create_blob_store(&config, tmp.path().to_path_buf()).err().unwrap();
        assert!(err.to_string().contains("unknown blob backend"));
    }

    #[test]
    fn http_backend_requires_base_url() {
        let config = BlobConfig {
            backend: "http".into(),
            ..BlobConfig::default()
        };
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(create_blob_store(&config, tmp.path().to_path_buf()).is_err());
    }
}
