use anyhow::Result;

use crate::backup::{BackupOptions, MapBackupService};
use crate::config::MapkeeperConfig;
use crate::store::SqliteStore;

/// Back up `map` (every partition when `None`) into the blob bucket.
pub fn backup(config: &MapkeeperConfig, map: Option<&str>) -> Result<()> {
    let scope = match map {
        Some(map) => super::parse_scope(map)?,
        None => crate::reset::MapScope::Combined,
    };

    let conn = crate::db::open_database(config.resolved_db_path())?;
    let store = SqliteStore::new(&conn);
    let blobs = super::open_blob_store(config)?;

    let service = MapBackupService::new(&store, blobs.as_ref(), BackupOptions::from(config));
    let report = service.run(scope)?;

    println!("{}", report.message);
    println!("  Folder:        {}", report.backup_folder);
    println!("  Files:         {}", report.stats.total_files);
    println!("  Failed files:  {}", report.stats.failed_files);
    println!("  Duration:      {} ms", report.stats.duration_ms);
    println!("  Rows:");
    for (table, count) in &report.stats.database {
        println!("    {:<20} {}", table, count);
    }
    Ok(())
}
