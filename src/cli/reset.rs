//! CLI `reset` command: wipe one map scope after typed confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use crate::config::MapkeeperConfig;
use crate::reset::{
    confirmation_phrase, MapResetService, MapScope, ParsedReset, ResetCommand, ResetOptions,
};
use crate::store::SqliteStore;

/// Reset `map`. Without `confirm`, prompts for the confirmation phrase on stdin.
pub fn reset(config: &MapkeeperConfig, map: &str, confirm: Option<&str>) -> Result<()> {
    let scope = super::parse_scope(map)?;
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;
    let store = SqliteStore::new(&conn);

    let confirm_text = match confirm {
        Some(text) => text.to_string(),
        None => {
            let counts = crate::inventory::inventory(&store, scope)?;
            println!("WARNING: This will permanently delete all {scope} data and files.");
            println!("Database: {}", db_path.display());
            println!(
                "  {} POIs, {} grid squares, {} comments, {} images",
                counts.pois, counts.grid_squares, counts.comments, counts.managed_images
            );
            print!("\nType {} to confirm: ", confirmation_phrase(scope));
            std::io::stdout().flush()?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;
            input.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let command = match scope {
        MapScope::Combined => ResetCommand::combined(&confirm_text)?,
        MapScope::Single(map) => match ResetCommand::parse(map.as_str(), &confirm_text)? {
            ParsedReset::Reset(command) => command,
            ParsedReset::HealthCheck => bail!("unexpected health check for {map}"),
        },
    };

    let blobs = super::open_blob_store(config)?;
    let service = MapResetService::new(&store, blobs.as_ref(), ResetOptions::from(config));
    let report = service.execute(command)?;

    println!("{}", report.message);
    println!("  Run id:           {}", report.run_id);
    println!("  Deleted records:  {}", report.stats.deleted_records);
    println!("  Deleted files:    {}", report.stats.deleted_files);
    println!("  Skipped files:    {}", report.stats.skipped_files);
    if !report.failed_files.is_empty() {
        println!("  Failed files:     {}", report.failed_files.len());
        for url in &report.failed_files {
            println!("    {url}");
        }
    }
    Ok(())
}
