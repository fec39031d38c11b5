//! CLI `backups` commands: list, delete and restore stored backups.

use anyhow::Result;

use crate::backup::catalog::{delete_backup, list_backup_summaries, BackupSummary};
use crate::backup::restore::MapRestoreService;
use crate::backup::BackupOptions;
use crate::config::MapkeeperConfig;
use crate::reset::{MapScope, MapType};
use crate::store::SqliteStore;

fn print_summary(backup: &BackupSummary) {
    match &backup.metadata {
        Some(meta) => {
            let rows: usize = meta.database.values().sum();
            println!(
                "  {:<48} {:>6} rows {:>6} files  {}",
                backup.name, rows, meta.files, meta.timestamp
            );
        }
        None => println!("  {:<48} (metadata unreadable)", backup.name),
    }
}

/// List stored backups of `map`, or of every scope when `None`.
pub fn list(config: &MapkeeperConfig, map: Option<&str>) -> Result<()> {
    let scopes = match map {
        Some(map) => vec![super::parse_scope(map)?],
        None => vec![
            MapScope::Single(MapType::DeepDesert),
            MapScope::Single(MapType::HaggaBasin),
            MapScope::Combined,
        ],
    };
    let blobs = super::open_blob_store(config)?;

    for scope in scopes {
        let backups = list_backup_summaries(blobs.as_ref(), &config.backup.folder, scope)?;
        println!("{scope} ({} backups)", backups.len());
        for backup in &backups {
            print_summary(backup);
        }
    }
    Ok(())
}

pub fn delete(config: &MapkeeperConfig, name: &str) -> Result<()> {
    let blobs = super::open_blob_store(config)?;
    let removed = delete_backup(blobs.as_ref(), &config.backup.folder, name)?;
    println!("Backup {name} deleted ({removed} files)");
    Ok(())
}

pub fn restore(config: &MapkeeperConfig, name: &str) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let store = SqliteStore::new(&conn);
    let blobs = super::open_blob_store(config)?;

    let service = MapRestoreService::new(&store, blobs.as_ref(), BackupOptions::from(config));
    let report = service.restore(name)?;

    println!("{}", report.message);
    println!("  Skipped rows:    {}", report.stats.skipped_rows);
    println!("  Restored files:  {}", report.stats.restored_files);
    println!("  Failed files:    {}", report.stats.failed_files);
    println!("  Rows inserted:");
    for (table, count) in &report.stats.database {
        println!("    {:<20} {}", table, count);
    }
    Ok(())
}
