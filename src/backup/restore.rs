//! Replay a stored backup into the database and bucket.
//!
//! Rows go back parents-first inside one savepoint, so a failed restore leaves
//! the database as it was. Rows whose key already exists are left alone, which
//! makes restoring twice harmless. Files are copied back from the backup folder
//! afterwards; a failed copy is counted and never undoes the rows.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::blob::{BlobError, BlobStore};
use crate::reset::scope::MapScope;
use crate::store::{DataStore, Record, StoreResult, Table};

use super::catalog::read_metadata;
use super::{BackupError, BackupFiles, BackupOptions, Snapshot};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStats {
    /// Rows inserted per table.
    pub database: BTreeMap<String, u64>,
    /// Rows already present, left untouched.
    pub skipped_rows: u64,
    pub restored_files: usize,
    pub failed_files: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub success: bool,
    pub message: String,
    pub backup_name: String,
    pub map_type: String,
    pub stats: RestoreStats,
}

/// Tables in insert order: every row's references exist before it does.
fn tables_parents_first(snapshot: &Snapshot) -> [(Table, &[Record]); 7] {
    [
        (Table::GridSquares, snapshot.grid_squares.as_slice()),
        (Table::Pois, snapshot.pois.as_slice()),
        (Table::Comments, snapshot.comments.as_slice()),
        (Table::ManagedImages, snapshot.managed_images.as_slice()),
        (Table::PoiImageLinks, snapshot.poi_image_links.as_slice()),
        (Table::CommentImageLinks, snapshot.comment_image_links.as_slice()),
        (Table::PoiEntityLinks, snapshot.poi_entity_links.as_slice()),
    ]
}

fn insert_snapshot(store: &dyn DataStore, snapshot: &Snapshot) -> StoreResult<BTreeMap<String, u64>> {
    let mut inserted = BTreeMap::new();
    for (table, rows) in tables_parents_first(snapshot) {
        let n = store.insert(table, rows)?;
        tracing::info!(%table, inserted = n, offered = rows.len(), "rows restored");
        inserted.insert(table.as_str().to_string(), n);
    }
    Ok(inserted)
}

pub struct MapRestoreService<'a> {
    store: &'a dyn DataStore,
    blobs: &'a dyn BlobStore,
    options: BackupOptions,
}

impl<'a> MapRestoreService<'a> {
    pub fn new(store: &'a dyn DataStore, blobs: &'a dyn BlobStore, options: BackupOptions) -> Self {
        Self {
            store,
            blobs,
            options,
        }
    }

    /// Restore the backup folder `name` under the configured backup folder.
    pub fn restore(&self, name: &str) -> Result<RestoreReport, BackupError> {
        let started = Instant::now();
        let span = tracing::info_span!("restore", backup = %name);
        let _guard = span.enter();

        let metadata = read_metadata(self.blobs, &self.options.folder, name)?;
        let scope: MapScope = metadata.map_type.parse().map_err(|e: String| {
            BackupError::CorruptBackup {
                name: name.to_string(),
                detail: e,
            }
        })?;
        tracing::info!(map_type = %scope, "restore started");

        self.store.begin()?;
        let database = match insert_snapshot(self.store, &metadata.database) {
            Ok(database) => {
                self.store.commit()?;
                database
            }
            Err(e) => {
                tracing::error!(error = %e, "row restore failed, rolling back");
                if let Err(rollback_err) = self.store.rollback() {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                return Err(e.into());
            }
        };

        let (restored_files, failed_files) = self.restore_files(&metadata.files);

        let offered: usize = metadata.database.row_counts().values().sum();
        let inserted: u64 = database.values().sum();
        let stats = RestoreStats {
            skipped_rows: (offered as u64).saturating_sub(inserted),
            database,
            restored_files,
            failed_files,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        self.store.log_operation(
            "restore",
            scope.as_str(),
            &json!({
                "backupName": name,
                "insertedRows": inserted,
                "skippedRows": stats.skipped_rows,
                "restoredFiles": stats.restored_files,
                "failedFiles": stats.failed_files,
            }),
        )?;

        tracing::info!(
            inserted_rows = inserted,
            skipped_rows = stats.skipped_rows,
            restored_files,
            failed_files,
            "restore complete"
        );

        Ok(RestoreReport {
            success: true,
            message: format!("Restore completed for {scope} from {name}"),
            backup_name: name.to_string(),
            map_type: scope.to_string(),
            stats,
        })
    }

    /// Copy every backed-up file to its original path. Returns (restored, failed).
    fn restore_files(&self, files: &BackupFiles) -> (usize, usize) {
        let prefix = format!("{}/files/", files.backup_folder);
        let mut restored = 0;
        let mut failed = 0;
        for copy in &files.copied_files {
            let Some(original) = copy.strip_prefix(&prefix) else {
                tracing::warn!(%copy, "backup copy outside the backup folder, not restored");
                failed += 1;
                continue;
            };
            match self.blobs.copy(copy, original) {
                Ok(()) | Err(BlobError::AlreadyExists(_)) => restored += 1,
                Err(e) => {
                    tracing::warn!(%copy, error = %e, "failed to restore file");
                    failed += 1;
                }
            }
        }
        (restored, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_come_before_the_rows_that_reference_them() {
        let snapshot = Snapshot::default();
        let order: Vec<Table> = tables_parents_first(&snapshot)
            .iter()
            .map(|(table, _)| *table)
            .collect();
        let position = |t: Table| order.iter().position(|o| *o == t).unwrap();

        assert!(position(Table::GridSquares) < position(Table::Pois));
        assert!(position(Table::Pois) < position(Table::Comments));
        assert!(position(Table::Comments) < position(Table::CommentImageLinks));
        assert!(position(Table::ManagedImages) < position(Table::PoiImageLinks));
        assert!(position(Table::Pois) < position(Table::PoiEntityLinks));
        assert_eq!(order.len(), 7);
    }
}
