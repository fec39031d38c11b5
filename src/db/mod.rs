pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Tables counted by the health report, in dependency order (parents last).
const COUNTED_TABLES: [&str; 7] = [
    "poi_entity_links",
    "poi_image_links",
    "comment_image_links",
    "comments",
    "managed_images",
    "pois",
    "grid_squares",
];

/// Open (or create) the map database at the given path, with schema and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a fully migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub foreign_key_violations: u64,
    /// `(table, row count)` pairs in dependency order.
    pub row_counts: Vec<(String, u64)>,
}

/// Run `PRAGMA integrity_check` and `PRAGMA foreign_key_check`, and count rows
/// in every map table.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let integrity_ok = integrity_details == "ok";

    let foreign_key_violations = {
        let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        let mut n = 0u64;
        while rows.next()?.is_some() {
            n += 1;
        }
        n
    };

    let mut row_counts = Vec::with_capacity(COUNTED_TABLES.len());
    for table in COUNTED_TABLES {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        row_counts.push((table.to_string(), count as u64));
    }

    Ok(HealthReport {
        schema_version,
        integrity_ok,
        integrity_details,
        foreign_key_violations,
        row_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_database_is_migrated() {
        let conn = open_memory_database().unwrap();
        assert_eq!(
            migrations::get_schema_version(&conn).unwrap(),
            migrations::CURRENT_SCHEMA_VERSION
        );
    }

    #[test]
    fn health_report_on_empty_db() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.foreign_key_violations, 0);
        assert_eq!(report.row_counts.len(), COUNTED_TABLES.len());
        assert!(report.row_counts.iter().all(|(_, n)| *n == 0));
    }
}
