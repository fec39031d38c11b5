//! SQL DDL for the map database.
//!
//! Defines `grid_squares`, `pois`, `comments`, `managed_images`, the three link
//! tables, and `schema_meta`. Foreign keys carry no `ON DELETE CASCADE`: rows must
//! be removed leaves-first, which is what the reset service does. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the core tables.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS grid_squares (
    id TEXT PRIMARY KEY,
    coordinate TEXT NOT NULL UNIQUE,
    screenshot_url TEXT,
    original_screenshot_url TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pois (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    map_type TEXT NOT NULL CHECK(map_type IN ('deep_desert','hagga_basin')),
    grid_square_id TEXT REFERENCES grid_squares(id),
    coordinates_x REAL,
    coordinates_y REAL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pois_map_type ON pois(map_type);
CREATE INDEX IF NOT EXISTS idx_pois_grid_square ON pois(grid_square_id);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    poi_id TEXT REFERENCES pois(id),
    grid_square_id TEXT REFERENCES grid_squares(id),
    created_at TEXT NOT NULL,
    CHECK(poi_id IS NOT NULL OR grid_square_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_comments_poi ON comments(poi_id);
CREATE INDEX IF NOT EXISTS idx_comments_grid_square ON comments(grid_square_id);

CREATE TABLE IF NOT EXISTS managed_images (
    id TEXT PRIMARY KEY,
    original_url TEXT NOT NULL,
    processed_url TEXT,
    image_type TEXT NOT NULL CHECK(image_type IN (
        'poi_screenshot','comment_image','profile_avatar',
        'custom_icon','item_screenshot','schematic_screenshot'
    )),
    mime_type TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_managed_images_type ON managed_images(image_type);

CREATE TABLE IF NOT EXISTS poi_image_links (
    poi_id TEXT NOT NULL REFERENCES pois(id),
    image_id TEXT NOT NULL REFERENCES managed_images(id),
    display_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (poi_id, image_id)
);

CREATE INDEX IF NOT EXISTS idx_poi_image_links_image ON poi_image_links(image_id);

CREATE TABLE IF NOT EXISTS comment_image_links (
    comment_id TEXT NOT NULL REFERENCES comments(id),
    image_id TEXT NOT NULL REFERENCES managed_images(id),
    PRIMARY KEY (comment_id, image_id)
);

CREATE INDEX IF NOT EXISTS idx_comment_image_links_image ON comment_image_links(image_id);

CREATE TABLE IF NOT EXISTS poi_entity_links (
    poi_id TEXT NOT NULL REFERENCES pois(id),
    entity_id TEXT NOT NULL,
    PRIMARY KEY (poi_id, entity_id)
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
