//! Row counts for one map scope, as seen by the reset.

use serde::Serialize;

use crate::reset::discovery::discover;
use crate::reset::scope::{MapScope, LINKABLE_IMAGE_TYPES};
use crate::store::{DataStore, Filter, StoreResult, Table};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub pois: u64,
    pub poi_image_links: u64,
    pub poi_entity_links: u64,
    pub comments: u64,
    pub comment_image_links: u64,
    /// Distinct images linked from the scope's POIs and comments.
    pub managed_images: u64,
    /// Linkable images with no links at all. Not scoped; orphans belong to no map.
    pub orphaned_images: u64,
    pub grid_squares: u64,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn count_in(store: &dyn DataStore, table: Table, filter: Filter) -> StoreResult<u64> {
    if filter.is_empty_in() {
        return Ok(0);
    }
    store.count(table, &filter)
}

pub fn inventory(store: &dyn DataStore, scope: MapScope) -> StoreResult<Inventory> {
    let plan = discover(store, scope)?;
    let len = |n: usize| n as u64;

    Ok(Inventory {
        pois: len(plan.poi_ids.len()),
        poi_image_links: count_in(store, Table::PoiImageLinks, Filter::In("poi_id", plan.poi_ids.clone()))?,
        poi_entity_links: count_in(
            store,
            Table::PoiEntityLinks,
            Filter::In("poi_id", plan.poi_ids.clone()),
        )?,
        comments: len(plan.comment_ids.len()),
        comment_image_links: count_in(
            store,
            Table::CommentImageLinks,
            Filter::In("comment_id", plan.comment_ids.clone()),
        )?,
        managed_images: len(plan.image_ids.len() + plan.shared_image_ids.len()),
        orphaned_images: len(store.select_unreferenced_images(&LINKABLE_IMAGE_TYPES)?.len()),
        grid_squares: len(plan.grid_squares.len()),
    })
}
