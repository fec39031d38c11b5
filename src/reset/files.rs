use serde::Serialize;

use crate::blob::{storage_path, BlobStore};

/// Per-URL outcome of the file phase.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDeletion {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    /// URLs with no `/<bucket>/` segment; nothing to delete.
    pub skipped: Vec<String>,
}

/// Remove every file behind `urls`, one at a time. A failure is recorded and the
/// loop moves on; nothing here aborts the reset.
pub fn delete_files(blobs: &dyn BlobStore, bucket: &str, urls: &[String]) -> FileDeletion {
    let mut outcome = FileDeletion::default();

    for url in urls {
        let Some(path) = storage_path(url, bucket) else {
            tracing::debug!(%url, bucket, "no storage path in url, skipping");
            outcome.skipped.push(url.clone());
            continue;
        };

        match blobs.remove(path) {
            Ok(()) => outcome.deleted.push(url.clone()),
            Err(e) => {
                tracing::warn!(%url, path, error = %e, "failed to delete file");
                outcome.failed.push(url.clone());
            }
        }
    }

    tracing::info!(
        deleted = outcome.deleted.len(),
        failed = outcome.failed.len(),
        skipped = outcome.skipped.len(),
        "file phase complete"
    );
    outcome
}
