pub mod backup;
pub mod backups;
pub mod doctor;
pub mod inventory;
pub mod reset;

use anyhow::{anyhow, Result};

use crate::blob::{self, BlobStore};
use crate::config::MapkeeperConfig;
use crate::reset::MapScope;

/// Open the configured blob store.
fn open_blob_store(config: &MapkeeperConfig) -> Result<Box<dyn BlobStore>> {
    blob::create_blob_store(&config.blobs, config.resolved_blob_root())
}

fn parse_scope(map: &str) -> Result<MapScope> {
    map.parse()
        .map_err(|e: String| anyhow!("{e}. Valid types: deep_desert, hagga_basin, combined"))
}
