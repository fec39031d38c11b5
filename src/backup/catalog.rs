//! Stored backups: listing with metadata, and deleting one by name.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::blob::{BlobError, BlobStore};
use crate::reset::scope::{MapScope, MapType};

use super::prune::{list_backups, remove_folder};
use super::{BackupError, BackupMetadata, METADATA_FILE};

const SCOPES: [MapScope; 3] = [
    MapScope::Single(MapType::DeepDesert),
    MapScope::Single(MapType::HaggaBasin),
    MapScope::Combined,
];

/// Counts read from a backup's metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSummary {
    pub timestamp: String,
    pub database: BTreeMap<String, usize>,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub name: String,
    pub folder: String,
    pub map_type: String,
    /// `None` when the metadata file is missing or unreadable.
    pub metadata: Option<MetadataSummary>,
}

/// Scope encoded in a backup folder name such as `backup_deep_desert_<timestamp>`.
pub fn backup_scope(name: &str) -> Option<MapScope> {
    if name.contains(['/', '\\']) || name.contains("..") {
        return None;
    }
    SCOPES
        .into_iter()
        .find(|scope| name.starts_with(&format!("backup_{scope}_")))
}

/// Download and parse `<folder>/<name>/backup_metadata.json`.
pub fn read_metadata(
    blobs: &dyn BlobStore,
    folder: &str,
    name: &str,
) -> Result<BackupMetadata, BackupError> {
    if backup_scope(name).is_none() {
        return Err(BackupError::UnknownBackup(name.to_string()));
    }
    let path = format!("{folder}/{name}/{METADATA_FILE}");
    let bytes = blobs.download(&path).map_err(|source| match source {
        BlobError::NotFound(_) => BackupError::UnknownBackup(name.to_string()),
        source => BackupError::Blob { path, source },
    })?;
    serde_json::from_slice(&bytes).map_err(|e| BackupError::CorruptBackup {
        name: name.to_string(),
        detail: e.to_string(),
    })
}

/// Backups of `scope`, newest first, each with its metadata counts.
pub fn list_backup_summaries(
    blobs: &dyn BlobStore,
    folder: &str,
    scope: MapScope,
) -> Result<Vec<BackupSummary>, BackupError> {
    let names = list_backups(blobs, folder, scope).map_err(|source| BackupError::Blob {
        path: folder.to_string(),
        source,
    })?;

    Ok(names
        .into_iter()
        .map(|name| {
            let metadata = match read_metadata(blobs, folder, &name) {
                Ok(metadata) => Some(MetadataSummary {
                    database: metadata.database.row_counts(),
                    files: metadata.files.copied_files.len(),
                    timestamp: metadata.timestamp,
                }),
                Err(e) => {
                    tracing::warn!(backup = %name, error = %e, "could not read backup metadata");
                    None
                }
            };
            BackupSummary {
                folder: format!("{folder}/{name}"),
                map_type: scope.to_string(),
                name,
                metadata,
            }
        })
        .collect())
}

/// Every stored backup, grouped by scope name.
pub fn list_all_backups(
    blobs: &dyn BlobStore,
    folder: &str,
) -> Result<BTreeMap<String, Vec<BackupSummary>>, BackupError> {
    SCOPES
        .into_iter()
        .map(|scope| Ok((scope.to_string(), list_backup_summaries(blobs, folder, scope)?)))
        .collect()
}

/// Delete the backup folder `name` and everything in it. Returns the number of
/// files removed.
pub fn delete_backup(blobs: &dyn BlobStore, folder: &str, name: &str) -> Result<usize, BackupError> {
    let scope = backup_scope(name).ok_or_else(|| BackupError::UnknownBackup(name.to_string()))?;
    let existing = list_backups(blobs, folder, scope).map_err(|source| BackupError::Blob {
        path: folder.to_string(),
        source,
    })?;
    if !existing.iter().any(|n| n == name) {
        return Err(BackupError::UnknownBackup(name.to_string()));
    }

    let path = format!("{folder}/{name}");
    let removed = remove_folder(blobs, &path).map_err(|source| BackupError::Blob {
        path: path.clone(),
        source,
    })?;
    tracing::info!(backup = %path, files = removed, "backup deleted");
    Ok(removed)
}
