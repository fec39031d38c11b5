//! The reset orchestrator.
//!
//! [`MapResetService::execute`] runs discovery, the file phase and the row phase
//! in that order, then reports what happened. The file phase never fails the run;
//! any store error during discovery or row deletion does.

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::config::MapkeeperConfig;
use crate::store::{DataStore, StoreError, StoreResult};

use super::command::{ParsedReset, ResetCommand, ValidationError};
use super::discovery::{discover, ResetPlan};
use super::files::{delete_files, FileDeletion};
use super::rows::{delete_rows, DeletionBreakdown};

pub const HEALTH_CHECK_MESSAGE: &str = "Health check passed - function is responsive";

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ResetOptions {
    /// Bucket name that marks where the storage path starts inside a file URL.
    pub bucket: String,
    /// Run the row phase inside a savepoint.
    pub transactional: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            bucket: "screenshots".into(),
            transactional: true,
        }
    }
}

impl From<&MapkeeperConfig> for ResetOptions {
    fn from(config: &MapkeeperConfig) -> Self {
        Self {
            bucket: config.blobs.bucket.clone(),
            transactional: config.reset.transactional,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetStats {
    pub deleted_records: u64,
    pub deleted_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub breakdown: DeletionBreakdown,
}

/// Result of a completed reset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub success: bool,
    pub message: String,
    pub run_id: Uuid,
    pub map_type: String,
    pub stats: ResetStats,
    pub failed_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ResetOutcome {
    HealthCheck,
    Completed(ResetReport),
}

/// Destroys every row and file belonging to one map scope.
pub struct MapResetService<'a> {
    store: &'a dyn DataStore,
    blobs: &'a dyn BlobStore,
    options: ResetOptions,
}

impl<'a> MapResetService<'a> {
    pub fn new(store: &'a dyn DataStore, blobs: &'a dyn BlobStore, options: ResetOptions) -> Self {
        Self {
            store,
            blobs,
            options,
        }
    }

    /// Validate a raw request and, if it is a confirmed reset, run it.
    pub fn handle(&self, map_type: &str, confirm_text: &str) -> Result<ResetOutcome, ResetError> {
        match ResetCommand::parse(map_type, confirm_text)? {
            ParsedReset::HealthCheck => {
                tracing::debug!("reset health check");
                Ok(ResetOutcome::HealthCheck)
            }
            ParsedReset::Reset(command) => self.execute(command).map(ResetOutcome::Completed),
        }
    }

    /// Run a confirmed reset.
    pub fn execute(&self, command: ResetCommand) -> Result<ResetReport, ResetError> {
        let scope = command.scope();
        let run_id = Uuid::now_v7();
        let span = tracing::info_span!("reset", %run_id, map_type = %scope);
        let _guard = span.enter();

        tracing::info!("reset started");

        let plan = discover(self.store, scope)?;
        tracing::info!(
            pois = plan.poi_ids.len(),
            grid_squares = plan.grid_squares.len(),
            comments = plan.comment_ids.len(),
            files = plan.file_urls.len(),
            "discovery complete"
        );

        let files = delete_files(self.blobs, &self.options.bucket, &plan.file_urls);

        let breakdown = if self.options.transactional {
            self.store.begin()?;
            match self.delete_and_log(&plan, &files, run_id) {
                Ok(breakdown) => {
                    self.store.commit()?;
                    breakdown
                }
                Err(e) => {
                    tracing::error!(error = %e, "row deletion failed, rolling back");
                    if let Err(rollback_err) = self.store.rollback() {
                        tracing::error!(error = %rollback_err, "rollback failed");
                    }
                    return Err(e.into());
                }
            }
        } else {
            self.delete_and_log(&plan, &files, run_id).inspect_err(|e| {
                tracing::error!(error = %e, "row deletion failed, earlier steps stay committed");
            })?
        };

        let mut warnings = Vec::new();
        if !files.failed.is_empty() {
            warnings.push(format!("Failed to delete {} files", files.failed.len()));
        }

        let report = ResetReport {
            success: true,
            message: format!("Reset completed for {scope}"),
            run_id,
            map_type: scope.to_string(),
            stats: ResetStats {
                deleted_records: breakdown.total(),
                deleted_files: files.deleted.len(),
                failed_files: files.failed.len(),
                skipped_files: files.skipped.len(),
                breakdown,
            },
            failed_files: files.failed,
            warnings,
        };

        tracing::info!(
            deleted_records = report.stats.deleted_records,
            deleted_files = report.stats.deleted_files,
            failed_files = report.stats.failed_files,
            "reset complete"
        );
        Ok(report)
    }

    fn delete_and_log(
        &self,
        plan: &ResetPlan,
        files: &FileDeletion,
        run_id: Uuid,
    ) -> StoreResult<DeletionBreakdown> {
        let breakdown = delete_rows(self.store, plan)?;
        self.store.log_operation(
            "reset",
            plan.scope.as_str(),
            &json!({
                "runId": run_id,
                "deletedRecords": breakdown.total(),
                "breakdown": breakdown,
                "deletedFiles": files.deleted.len(),
                "failedFiles": files.failed,
            }),
        )?;
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::local::LocalBlobStore;
    use crate::db;
    use crate::store::SqliteStore;

    #[test]
    fn health_check_touches_nothing() {
        let conn = db::open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO pois (id, title, map_type, created_at) VALUES ('p', 't', 'hagga_basin', 'x')",
            [],
        )
        .unwrap();
        let tmp = tempfile::TempDir::new().unwrap();
        let blobs = LocalBlobStore::new(tmp.path()).unwrap();
        let store = SqliteStore::new(&conn);
        let service = MapResetService::new(&store, &blobs, ResetOptions::default());

        let outcome = service.handle("test_health_check", "whatever").unwrap();
        assert!(matches!(outcome, ResetOutcome::HealthCheck));

        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pois", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn empty_partition_resets_cleanly() {
        let conn = db::open_memory_database().unwrap();
        let tmp = tempfile::TempDir::new().unwrap();
        let blobs = LocalBlobStore::new(tmp.path()).unwrap();
        let store = SqliteStore::new(&conn);
        let service = MapResetService::new(&store, &blobs, ResetOptions::default());

        let ResetOutcome::Completed(report) =
            service.handle("hagga_basin", "DELETE HAGGA BASIN").unwrap()
        else {
            panic!("expected a completed reset");
        };
        assert!(report.success);
        assert_eq!(report.message, "Reset completed for hagga_basin");
        assert_eq!(report.stats.deleted_records, 0);
        assert!(report.warnings.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("warnings").is_none());
        assert_eq!(json["stats"]["deletedRecords"], 0);
    }

    #[test]
    fn successful_reset_is_logged() {
        let conn = db::open_memory_database().unwrap();
        let tmp = tempfile::TempDir::new().unwrap();
        let blobs = LocalBlobStore::new(tmp.path()).unwrap();
        let store = SqliteStore::new(&conn);
        let service = MapResetService::new(&store, &blobs, ResetOptions::default());

        service.handle("deep_desert", "DELETE DEEP DESERT").unwrap();

        let op: String = conn
            .query_row(
                "SELECT operation FROM operation_log WHERE map_type = 'deep_desert'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(op, "reset");
    }
}
