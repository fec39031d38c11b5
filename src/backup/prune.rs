use crate::blob::{list_files_recursive, BlobError, BlobStore};
use crate::reset::scope::MapScope;

/// Names of this scope's backup folders under `folder`, newest first.
pub fn list_backups(
    blobs: &dyn BlobStore,
    folder: &str,
    scope: MapScope,
) -> Result<Vec<String>, BlobError> {
    let prefix = format!("backup_{scope}_");
    let mut names: Vec<String> = blobs
        .list(folder)?
        .into_iter()
        .filter(|e| e.is_folder && e.name.starts_with(&prefix))
        .map(|e| e.name)
        .collect();
    // Timestamps are zero-padded UTC, so name order is age order.
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Remove every backup of `scope` beyond the newest `keep`. Returns how many
/// were removed. Failures are logged; they never fail the backup that triggered
/// the prune.
pub fn prune_backups(blobs: &dyn BlobStore, folder: &str, scope: MapScope, keep: usize) -> usize {
    let backups = match list_backups(blobs, folder, scope) {
        Ok(backups) => backups,
        Err(e) => {
            tracing::warn!(folder, error = %e, "could not list backups, skipping prune");
            return 0;
        }
    };

    let mut removed = 0;
    for name in backups.iter().skip(keep) {
        let path = format!("{folder}/{name}");
        match remove_folder(blobs, &path) {
            Ok(files) => {
                tracing::info!(backup = %path, files, "old backup removed");
                removed += 1;
            }
            Err(e) => tracing::warn!(backup = %path, error = %e, "failed to remove old backup"),
        }
    }
    removed
}

pub(crate) fn remove_folder(blobs: &dyn BlobStore, path: &str) -> Result<usize, BlobError> {
    let files = list_files_recursive(blobs, path)?;
    for file in &files {
        blobs.remove(file)?;
    }
    Ok(files.len())
}
