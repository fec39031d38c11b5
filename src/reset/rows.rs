//! Row deletion in foreign-key dependency order.

use std::collections::HashSet;

use serde::Serialize;

use crate::store::{select_texts, DataStore, Filter, StoreResult, Table};

use super::discovery::ResetPlan;
use super::scope::LINKABLE_IMAGE_TYPES;

/// Rows removed per category.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionBreakdown {
    pub poi_entity_links: u64,
    pub poi_image_links: u64,
    pub comment_image_links: u64,
    pub comments: u64,
    pub orphaned_images: u64,
    pub pois: u64,
    pub grid_squares: u64,
}

impl DeletionBreakdown {
    pub fn total(&self) -> u64 {
        self.poi_entity_links
            + self.poi_image_links
            + self.comment_image_links
            + self.comments
            + self.orphaned_images
            + self.pois
            + self.grid_squares
    }
}

/// Count, then delete. Bulk deletes do not report affected rows.
fn count_and_delete(store: &dyn DataStore, table: Table, filter: Filter) -> StoreResult<u64> {
    if filter.is_empty_in() {
        return Ok(0);
    }
    let count = store.count(table, &filter)?;
    store.delete(table, &filter)?;
    tracing::info!(%table, deleted = count, "rows deleted");
    Ok(count)
}

/// Delete every row in `plan`, leaves first. The first error aborts the sequence;
/// the caller decides whether to roll back.
pub fn delete_rows(store: &dyn DataStore, plan: &ResetPlan) -> StoreResult<DeletionBreakdown> {
    let mut breakdown = DeletionBreakdown::default();

    breakdown.poi_entity_links = count_and_delete(
        store,
        Table::PoiEntityLinks,
        Filter::In("poi_id", plan.poi_ids.clone()),
    )?;
    breakdown.poi_image_links = count_and_delete(
        store,
        Table::PoiImageLinks,
        Filter::In("poi_id", plan.poi_ids.clone()),
    )?;
    breakdown.comment_image_links = count_and_delete(
        store,
        Table::CommentImageLinks,
        Filter::In("comment_id", plan.comment_ids.clone()),
    )?;
    breakdown.comments = count_and_delete(
        store,
        Table::Comments,
        Filter::In("id", plan.comment_ids.clone()),
    )?;

    // Must run after the link deletes above and against live link tables.
    let mut orphans = store.select_unreferenced_images(&LINKABLE_IMAGE_TYPES)?;
    orphans.extend(unlinked_plan_images(store, plan, &orphans)?);
    breakdown.orphaned_images =
        count_and_delete(store, Table::ManagedImages, Filter::In("id", orphans))?;

    breakdown.pois = count_and_delete(store, Table::Pois, Filter::In("id", plan.poi_ids.clone()))?;
    breakdown.grid_squares = count_and_delete(
        store,
        Table::GridSquares,
        Filter::In("id", plan.grid_square_ids()),
    )?;

    Ok(breakdown)
}

/// Plan images of any type that no link row references anymore. Their files are
/// already gone, so the rows go too.
fn unlinked_plan_images(
    store: &dyn DataStore,
    plan: &ResetPlan,
    already: &[String],
) -> StoreResult<Vec<String>> {
    let filter = Filter::In("image_id", plan.image_ids.clone());
    let mut keep: HashSet<String> = already.iter().cloned().collect();
    keep.extend(select_texts(store, Table::PoiImageLinks, "image_id", &filter)?);
    keep.extend(select_texts(store, Table::CommentImageLinks, "image_id", &filter)?);

    Ok(plan
        .image_ids
        .iter()
        .filter(|id| !keep.contains(id.as_str()))
        .cloned()
        .collect())
}
