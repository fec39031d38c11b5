//! Map backup: snapshot a scope's rows and files into a timestamped folder in
//! the blob bucket, then prune old snapshots.
//!
//! A backup reads through the same discovery as a reset, so restoring a backup
//! taken just before a reset brings back exactly what the reset removed.
//! [`catalog`] lists and deletes stored backups; [`restore`] replays one.

pub mod catalog;
pub mod prune;
pub mod restore;

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::blob::{storage_path, BlobError, BlobStore};
use crate::config::MapkeeperConfig;
use crate::reset::command::{ValidationError, HEALTH_CHECK_SENTINEL};
use crate::reset::discovery::{discover, ResetPlan};
use crate::reset::scope::MapScope;
use crate::store::{DataStore, Filter, Record, StoreError, Table};

pub const METADATA_FILE: &str = "backup_metadata.json";
const VALID_TYPES: [&str; 3] = ["deep_desert", "hagga_basin", "combined"];

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize backup metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage error at {path}: {source}")]
    Blob {
        path: String,
        #[source]
        source: BlobError,
    },

    #[error("Backup not found: {0}")]
    UnknownBackup(String),

    #[error("Backup {name} has unreadable metadata: {detail}")]
    CorruptBackup { name: String, detail: String },
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub bucket: String,
    /// Bucket folder that holds every `backup_<scope>_<timestamp>` folder.
    pub folder: String,
    pub max_stored_backups: usize,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            bucket: "screenshots".into(),
            folder: "backups".into(),
            max_stored_backups: 5,
        }
    }
}

impl From<&MapkeeperConfig> for BackupOptions {
    fn from(config: &MapkeeperConfig) -> Self {
        Self {
            bucket: config.blobs.bucket.clone(),
            folder: config.backup.folder.clone(),
            max_stored_backups: config.backup.max_stored_backups,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub total_files: usize,
    pub failed_files: usize,
    pub duration_ms: u64,
    /// Rows captured per table.
    pub database: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub success: bool,
    pub message: String,
    pub backup_folder: String,
    pub stats: BackupStats,
}

#[derive(Debug, Clone)]
pub enum BackupOutcome {
    HealthCheck,
    Completed(BackupReport),
}

/// Parse a requested backup scope. An absent or empty value means every partition.
pub fn parse_backup_scope(map_type: Option<&str>) -> Result<Option<MapScope>, ValidationError> {
    match map_type {
        Some(HEALTH_CHECK_SENTINEL) => Ok(None),
        None | Some("") => Ok(Some(MapScope::Combined)),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ValidationError::invalid_map_type(value, &VALID_TYPES)),
    }
}

/// Every row a scope owns, grouped by table.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub grid_squares: Vec<Record>,
    pub pois: Vec<Record>,
    pub comments: Vec<Record>,
    pub poi_entity_links: Vec<Record>,
    pub poi_image_links: Vec<Record>,
    pub comment_image_links: Vec<Record>,
    pub managed_images: Vec<Record>,
}

impl Snapshot {
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        [
            (Table::GridSquares, &self.grid_squares),
            (Table::Pois, &self.pois),
            (Table::Comments, &self.comments),
            (Table::PoiEntityLinks, &self.poi_entity_links),
            (Table::PoiImageLinks, &self.poi_image_links),
            (Table::CommentImageLinks, &self.comment_image_links),
            (Table::ManagedImages, &self.managed_images),
        ]
        .into_iter()
        .map(|(table, rows)| (table.as_str().to_string(), rows.len()))
        .collect()
    }

    /// File URLs referenced by the captured rows, deduplicated in order.
    pub fn file_urls(&self) -> Vec<String> {
        let grid = self
            .grid_squares
            .iter()
            .flat_map(|r| [r.non_empty_text("screenshot_url"), r.non_empty_text("original_screenshot_url")]);
        let images = self
            .managed_images
            .iter()
            .flat_map(|r| [r.non_empty_text("original_url"), r.non_empty_text("processed_url")]);

        let mut seen = HashSet::new();
        grid.chain(images)
            .flatten()
            .filter(|url| seen.insert(*url))
            .map(str::to_string)
            .collect()
    }
}

/// Where a backup's files went.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupFiles {
    /// Bucket paths of the files the captured rows reference.
    pub original_paths: Vec<String>,
    pub backup_folder: String,
    /// Paths of the copies under `<backup_folder>/files/`.
    pub copied_files: Vec<String>,
}

/// Contents of `backup_metadata.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    #[serde(default)]
    pub timestamp: String,
    pub map_type: String,
    #[serde(default)]
    pub database: Snapshot,
    #[serde(default)]
    pub files: BackupFiles,
}

fn full_rows(store: &dyn DataStore, table: Table, filter: Filter) -> Result<Vec<Record>, StoreError> {
    if filter.is_empty_in() {
        return Ok(Vec::new());
    }
    store.select(table, &[], &filter)
}

/// Read every row in `plan`. Shared images are captured too; the backup must
/// restore the links that point at them.
pub fn collect_snapshot(store: &dyn DataStore, plan: &ResetPlan) -> Result<Snapshot, StoreError> {
    let image_ids: Vec<String> = plan
        .image_ids
        .iter()
        .chain(&plan.shared_image_ids)
        .cloned()
        .collect();

    Ok(Snapshot {
        grid_squares: full_rows(store, Table::GridSquares, Filter::In("id", plan.grid_square_ids()))?,
        pois: full_rows(store, Table::Pois, Filter::In("id", plan.poi_ids.clone()))?,
        comments: full_rows(store, Table::Comments, Filter::In("id", plan.comment_ids.clone()))?,
        poi_entity_links: full_rows(
            store,
            Table::PoiEntityLinks,
            Filter::In("poi_id", plan.poi_ids.clone()),
        )?,
        poi_image_links: full_rows(
            store,
            Table::PoiImageLinks,
            Filter::In("poi_id", plan.poi_ids.clone()),
        )?,
        comment_image_links: full_rows(
            store,
            Table::CommentImageLinks,
            Filter::In("comment_id", plan.comment_ids.clone()),
        )?,
        managed_images: full_rows(store, Table::ManagedImages, Filter::In("id", image_ids))?,
    })
}

/// Folder-safe UTC timestamp, e.g. `2024-05-01T10-20-30-123Z`. Sorts chronologically.
fn folder_timestamp(now: &str) -> String {
    now.replace([':', '.'], "-")
}

pub struct MapBackupService<'a> {
    store: &'a dyn DataStore,
    blobs: &'a dyn BlobStore,
    options: BackupOptions,
}

impl<'a> MapBackupService<'a> {
    pub fn new(store: &'a dyn DataStore, blobs: &'a dyn BlobStore, options: BackupOptions) -> Self {
        Self {
            store,
            blobs,
            options,
        }
    }

    pub fn handle(&self, map_type: Option<&str>) -> Result<BackupOutcome, BackupError> {
        match parse_backup_scope(map_type)? {
            None => Ok(BackupOutcome::HealthCheck),
            Some(scope) => self.run(scope).map(BackupOutcome::Completed),
        }
    }

    pub fn run(&self, scope: MapScope) -> Result<BackupReport, BackupError> {
        let started = Instant::now();
        let span = tracing::info_span!("backup", map_type = %scope);
        let _guard = span.enter();

        let plan = discover(self.store, scope)?;
        let snapshot = collect_snapshot(self.store, &plan)?;

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let backup_folder = format!(
            "{}/backup_{scope}_{}",
            self.options.folder,
            folder_timestamp(&timestamp)
        );
        tracing::info!(%backup_folder, "backup started");

        let mut original_paths = Vec::new();
        let mut copied = Vec::new();
        let mut failed = 0usize;
        for url in snapshot.file_urls() {
            let Some(path) = storage_path(&url, &self.options.bucket) else {
                tracing::debug!(%url, "no storage path in url, not copied");
                continue;
            };
            original_paths.push(path.to_string());
            let dest = format!("{backup_folder}/files/{path}");
            match self.blobs.copy(path, &dest) {
                Ok(()) | Err(BlobError::AlreadyExists(_)) => copied.push(dest),
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to copy file into backup");
                    failed += 1;
                }
            }
        }

        let total_files = original_paths.len();
        let metadata = BackupMetadata {
            timestamp,
            map_type: scope.to_string(),
            database: snapshot,
            files: BackupFiles {
                original_paths,
                backup_folder: backup_folder.clone(),
                copied_files: copied,
            },
        };
        let metadata_path = format!("{backup_folder}/{METADATA_FILE}");
        let bytes = serde_json::to_vec_pretty(&metadata)?;
        self.blobs
            .upload(&metadata_path, &bytes, "application/json")
            .map_err(|source| BackupError::Blob {
                path: metadata_path.clone(),
                source,
            })?;

        let pruned = prune::prune_backups(
            self.blobs,
            &self.options.folder,
            scope,
            self.options.max_stored_backups,
        );

        let database = metadata.database.row_counts();
        let stats = BackupStats {
            total_files,
            failed_files: failed,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            database,
        };

        self.store.log_operation(
            "backup",
            scope.as_str(),
            &json!({
                "backupFolder": backup_folder,
                "totalFiles": stats.total_files,
                "failedFiles": stats.failed_files,
                "pruned": pruned,
            }),
        )?;

        tracing::info!(
            total_files = stats.total_files,
            failed_files = stats.failed_files,
            pruned,
            duration_ms = stats.duration_ms,
            "backup complete"
        );

        Ok(BackupReport {
            success: true,
            message: format!("Backup completed for {scope}"),
            backup_folder,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reset::scope::MapType;

    #[test]
    fn scope_defaults_to_combined() {
        assert_eq!(parse_backup_scope(None), Ok(Some(MapScope::Combined)));
        assert_eq!(parse_backup_scope(Some("")), Ok(Some(MapScope::Combined)));
        assert_eq!(
            parse_backup_scope(Some("hagga_basin")),
            Ok(Some(MapScope::Single(MapType::HaggaBasin)))
        );
        assert_eq!(parse_backup_scope(Some("test_health_check")), Ok(None));
    }

    #[test]
    fn invalid_scope_lists_combined() {
        let err = parse_backup_scope(Some("both")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid map type: both. Valid types: deep_desert, hagga_basin, combined"
        );
    }

    #[test]
    fn folder_timestamp_strips_separators() {
        assert_eq!(
            folder_timestamp("2024-05-01T10:20:30.123Z"),
            "2024-05-01T10-20-30-123Z"
        );
    }

    #[test]
    fn metadata_tolerates_missing_sections() {
        let metadata: BackupMetadata =
            serde_json::from_str(r#"{"mapType":"hagga_basin","database":{"pois":[{"id":"p1"}]}}"#)
                .unwrap();
        assert_eq!(metadata.map_type, "hagga_basin");
        assert_eq!(metadata.database.pois.len(), 1);
        assert!(metadata.database.grid_squares.is_empty());
        assert!(metadata.files.copied_files.is_empty());
    }

    #[test]
    fn snapshot_urls_are_deduplicated() {
        let mut square = Record::default();
        square.insert("screenshot_url", json!("https://h/screenshots/g/a.webp"));
        square.insert("original_screenshot_url", json!("https://h/screenshots/g/a.webp"));
        let mut image = Record::default();
        image.insert("original_url", json!("https://h/screenshots/p/i.png"));
        image.insert("processed_url", json!(""));

        let snapshot = Snapshot {
            grid_squares: vec![square],
            managed_images: vec![image],
            ..Default::default()
        };
        assert_eq!(
            snapshot.file_urls(),
            vec!["https://h/screenshots/g/a.webp", "https://h/screenshots/p/i.png"]
        );
        assert_eq!(snapshot.row_counts()["grid_squares"], 1);
        assert_eq!(snapshot.row_counts()["pois"], 0);
    }
}
