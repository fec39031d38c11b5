#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use mapkeeper::blob::{BlobEntry, BlobError, BlobStore};
use mapkeeper::db;
use rusqlite::Connection;

pub const BUCKET: &str = "screenshots";
const TS: &str = "2024-03-01T12:00:00Z";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Public URL of a bucket path, shaped like the ones the app stores.
pub fn url(path: &str) -> String {
    format!("https://maps.example/storage/v1/object/public/{BUCKET}/{path}")
}

/// Bucket paths referenced by [`seed_map`], with the id of the row that owns each.
pub const SEEDED_FILES: [(&str, &str); 10] = [
    ("g_a1", "grid/a1.webp"),
    ("g_a1", "grid/a1_original.png"),
    ("g_i9", "grid/i9.webp"),
    ("g_j1", "grid/j1.webp"),
    ("img_dd", "poi/dd1.png"),
    ("img_dd", "poi/dd1_cropped.webp"),
    ("img_dd_c", "comments/c1.png"),
    ("img_hb", "poi/hb1.png"),
    ("img_shared", "poi/shared.png"),
    ("img_icon", "icons/sietch.png"),
];

/// Seed both partitions.
///
/// Deep Desert: grid squares A1 and I9 (plus J1 and A0, which fall outside the
/// grid pattern), POIs `dd1` on A1 and `dd2`, a comment on `dd1` with an image,
/// and a comment on square A1.
///
/// Hagga Basin: POIs `hb1` and `hb2`, a comment on `hb1`.
///
/// `img_shared` is linked from both `dd2` and `hb2`. `img_orphan` is a
/// pre-existing orphan and `img_icon` an unlinked custom icon.
pub fn seed_map(conn: &Connection) {
    conn.execute_batch(&format!(
        "INSERT INTO grid_squares (id, coordinate, screenshot_url, original_screenshot_url, created_at) VALUES
            ('g_a1', 'A1', '{a1}', '{a1o}', '{TS}'),
            ('g_i9', 'I9', '{i9}', NULL, '{TS}'),
            ('g_j1', 'J1', '{j1}', NULL, '{TS}'),
            ('g_a0', 'A0', NULL, NULL, '{TS}');

         INSERT INTO pois (id, title, map_type, grid_square_id, created_at) VALUES
            ('dd1', 'Crashed Carryall', 'deep_desert', 'g_a1', '{TS}'),
            ('dd2', 'Spice Field', 'deep_desert', NULL, '{TS}'),
            ('hb1', 'Sietch Entrance', 'hagga_basin', NULL, '{TS}'),
            ('hb2', 'Testing Station', 'hagga_basin', NULL, '{TS}');

         INSERT INTO comments (id, content, poi_id, grid_square_id, created_at) VALUES
            ('c_dd1', 'worm sign nearby', 'dd1', NULL, '{TS}'),
            ('c_sq', 'storm wall here', NULL, 'g_a1', '{TS}'),
            ('c_j1', 'off the grid', NULL, 'g_j1', '{TS}'),
            ('c_hb', 'water cache', 'hb1', NULL, '{TS}');

         INSERT INTO managed_images (id, original_url, processed_url, image_type, created_at) VALUES
            ('img_dd', '{dd}', '{ddc}', 'poi_screenshot', '{TS}'),
            ('img_dd_c', '{c1}', NULL, 'comment_image', '{TS}'),
            ('img_hb', '{hb}', '', 'poi_screenshot', '{TS}'),
            ('img_shared', '{shared}', NULL, 'poi_screenshot', '{TS}'),
            ('img_orphan', '{orphan}', NULL, 'poi_screenshot', '{TS}'),
            ('img_icon', '{icon}', NULL, 'custom_icon', '{TS}');

         INSERT INTO poi_image_links (poi_id, image_id, display_order) VALUES
            ('dd1', 'img_dd', 0),
            ('dd2', 'img_shared', 0),
            ('hb1', 'img_hb', 0),
            ('hb2', 'img_shared', 1);

         INSERT INTO comment_image_links (comment_id, image_id) VALUES ('c_dd1', 'img_dd_c');

         INSERT INTO poi_entity_links (poi_id, entity_id) VALUES
            ('dd1', 'spice_melange'), ('dd1', 'sandworm'), ('hb1', 'stillsuit');",
        a1 = url("grid/a1.webp"),
        a1o = url("grid/a1_original.png"),
        i9 = url("grid/i9.webp"),
        j1 = url("grid/j1.webp"),
        dd = url("poi/dd1.png"),
        ddc = url("poi/dd1_cropped.webp"),
        c1 = url("comments/c1.png"),
        hb = url("poi/hb1.png"),
        shared = url("poi/shared.png"),
        orphan = url("poi/orphan.png"),
        icon = url("icons/sietch.png"),
    ))
    .unwrap();
}

/// Upload a placeholder for every file [`seed_map`] references.
pub fn seed_files(blobs: &dyn BlobStore) {
    for (_, path) in SEEDED_FILES {
        blobs.upload(path, path.as_bytes(), "image/png").unwrap();
    }
    blobs.upload("poi/orphan.png", b"orphan", "image/png").unwrap();
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

pub fn exists(conn: &Connection, table: &str, id: &str) -> bool {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
        [id],
        |r| r.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

/// In-memory bucket. Any path ending in a suffix registered with
/// [`FakeBlobStore::fail_on`] fails every operation with an HTTP 500.
#[derive(Default)]
pub struct FakeBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, suffix: &str) {
        self.failing.lock().unwrap().insert(suffix.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn check(&self, path: &str) -> Result<(), BlobError> {
        if self.failing.lock().unwrap().iter().any(|s| path.ends_with(s.as_str())) {
            return Err(BlobError::Http {
                status: 500,
                message: format!("injected failure for {path}"),
            });
        }
        Ok(())
    }
}

impl BlobStore for FakeBlobStore {
    fn remove(&self, path: &str) -> Result<(), BlobError> {
        self.check(path)?;
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        self.check(from)?;
        self.check(to)?;
        let mut objects = self.objects.lock().unwrap();
        let bytes = objects
            .get(from)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(from.to_string()))?;
        if objects.contains_key(to) {
            return Err(BlobError::AlreadyExists(to.to_string()));
        }
        objects.insert(to.to_string(), bytes);
        Ok(())
    }

    fn upload(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), BlobError> {
        self.check(path)?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError> {
        self.check(prefix)?;
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let mut entries: BTreeMap<String, bool> = BTreeMap::new();
        for key in self.objects.lock().unwrap().keys() {
            if let Some(rest) = key.strip_prefix(&dir) {
                match rest.split_once('/') {
                    Some((folder, _)) => entries.insert(folder.to_string(), true),
                    None => entries.insert(rest.to_string(), false),
                };
            }
        }
        Ok(entries
            .into_iter()
            .map(|(name, is_folder)| BlobEntry { name, is_folder })
            .collect())
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.check(path)?;
        self.get(path)
            .ok_or_else(|| BlobError::NotFound(path.to_string()))
    }
}
