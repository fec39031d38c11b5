//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::MapkeeperConfig;
use crate::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &MapkeeperConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mapkeeper serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Mapkeeper Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Blob storage:");
    println!("  Backend:         {}", config.blobs.backend);
    println!("  Bucket:          {}", config.blobs.bucket);
    match config.blobs.backend.as_str() {
        "local" => {
            let root = config.resolved_blob_root();
            let state = if root.is_dir() { "present" } else { "missing" };
            println!("  Root:            {} ({state})", root.display());
        }
        _ => println!("  Base URL:        {}", config.blobs.base_url),
    }
    println!();
    println!("Row counts:");
    for (table, count) in &report.row_counts {
        println!("  {:<20} {}", table, count);
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }
    if report.foreign_key_violations == 0 {
        println!("Foreign keys:      OK");
    } else {
        println!(
            "Foreign keys:      {} dangling references",
            report.foreign_key_violations
        );
    }

    if !report.integrity_ok {
        println!();
        println!("Recovery steps:");
        println!("  1. Stop the server and restore the database file from a copy.");
        println!("  2. Re-apply rows from the newest backup_metadata.json in the backup folder.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
