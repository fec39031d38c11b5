use anyhow::Result;

use crate::config::MapkeeperConfig;
use crate::store::SqliteStore;

/// Print the row counts a reset of `map` would remove.
pub fn inventory(config: &MapkeeperConfig, map: &str) -> Result<()> {
    let scope = super::parse_scope(map)?;
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let store = SqliteStore::new(&conn);

    let counts = crate::inventory::inventory(&store, scope)?;

    println!("Inventory: {scope}");
    println!("{}", "=".repeat(40));
    println!("  POIs:                {}", counts.pois);
    println!("  POI image links:     {}", counts.poi_image_links);
    println!("  POI entity links:    {}", counts.poi_entity_links);
    println!("  Comments:            {}", counts.comments);
    println!("  Comment image links: {}", counts.comment_image_links);
    println!("  Managed images:      {}", counts.managed_images);
    println!("  Grid squares:        {}", counts.grid_squares);
    println!();
    println!("Orphaned images (all maps): {}", counts.orphaned_images);

    if counts.is_empty() {
        println!("\nNothing to reset.");
    }
    Ok(())
}
