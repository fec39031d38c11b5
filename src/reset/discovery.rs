//! Read-only discovery of everything a scope owns.
//!
//! Produces a [`ResetPlan`]: the POI, grid-square, comment and image ids that a
//! reset (or backup) of the scope covers, plus the deduplicated file URLs reachable
//! from them. Later phases act only on these ids and never re-derive them.

use std::collections::HashSet;

use crate::store::{select_texts, DataStore, Filter, StoreResult, Table};

use super::scope::MapScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSquareRef {
    pub id: String,
    pub coordinate: String,
}

#[derive(Debug, Clone)]
pub struct ResetPlan {
    pub scope: MapScope,
    pub poi_ids: Vec<String>,
    pub grid_squares: Vec<GridSquareRef>,
    pub comment_ids: Vec<String>,
    /// Images linked only from rows in this plan.
    pub image_ids: Vec<String>,
    /// Images linked from this plan and from rows outside it. Their files stay.
    pub shared_image_ids: Vec<String>,
    pub file_urls: Vec<String>,
}

impl ResetPlan {
    pub fn grid_square_ids(&self) -> Vec<String> {
        self.grid_squares.iter().map(|s| s.id.clone()).collect()
    }
}

/// Append `items` to `out`, skipping anything already seen.
fn extend_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
}

fn unique(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    extend_unique(&mut out, &mut HashSet::new(), items);
    out
}

/// Resolve the plan for `scope`.
pub fn discover(store: &dyn DataStore, scope: MapScope) -> StoreResult<ResetPlan> {
    // a. POIs
    let poi_filter = match scope.map_type() {
        Some(map) => Filter::Eq("map_type", map.as_str().to_string()),
        None => Filter::All,
    };
    let poi_ids = unique(select_texts(store, Table::Pois, "id", &poi_filter)?);

    // b. Grid squares
    let square_rows = if scope.includes_grid() {
        store.select(
            Table::GridSquares,
            &["id", "coordinate", "screenshot_url", "original_screenshot_url"],
            &Filter::All,
        )?
    } else {
        Vec::new()
    };
    let square_rows: Vec<_> = square_rows
        .into_iter()
        .filter(|row| scope.owns_grid_square(row.text("coordinate").unwrap_or_default()))
        .collect();
    let grid_squares: Vec<GridSquareRef> = square_rows
        .iter()
        .filter_map(|row| {
            Some(GridSquareRef {
                id: row.text("id")?.to_string(),
                coordinate: row.text("coordinate")?.to_string(),
            })
        })
        .collect();
    let grid_ids: Vec<String> = grid_squares.iter().map(|s| s.id.clone()).collect();

    // c. Comments on those POIs and squares
    let mut comment_ids = Vec::new();
    let mut seen = HashSet::new();
    extend_unique(
        &mut comment_ids,
        &mut seen,
        select_texts(store, Table::Comments, "id", &Filter::In("poi_id", poi_ids.clone()))?,
    );
    extend_unique(
        &mut comment_ids,
        &mut seen,
        select_texts(store, Table::Comments, "id", &Filter::In("grid_square_id", grid_ids))?,
    );

    // d. Linked images, split into exclusive and shared
    let mut candidates = Vec::new();
    let mut seen = HashSet::new();
    extend_unique(
        &mut candidates,
        &mut seen,
        select_texts(store, Table::PoiImageLinks, "image_id", &Filter::In("poi_id", poi_ids.clone()))?,
    );
    extend_unique(
        &mut candidates,
        &mut seen,
        select_texts(
            store,
            Table::CommentImageLinks,
            "image_id",
            &Filter::In("comment_id", comment_ids.clone()),
        )?,
    );

    let shared = shared_images(store, &candidates, &poi_ids, &comment_ids)?;
    let (shared_image_ids, image_ids): (Vec<String>, Vec<String>) =
        candidates.into_iter().partition(|id| shared.contains(id));

    let mut file_urls = Vec::new();
    let mut seen = HashSet::new();
    for row in &square_rows {
        let urls = ["screenshot_url", "original_screenshot_url"]
            .into_iter()
            .filter_map(|col| row.non_empty_text(col).map(str::to_string));
        extend_unique(&mut file_urls, &mut seen, urls);
    }
    if !image_ids.is_empty() {
        let images = store.select(
            Table::ManagedImages,
            &["id", "original_url", "processed_url"],
            &Filter::In("id", image_ids.clone()),
        )?;
        for row in &images {
            let urls = ["original_url", "processed_url"]
                .into_iter()
                .filter_map(|col| row.non_empty_text(col).map(str::to_string));
            extend_unique(&mut file_urls, &mut seen, urls);
        }
    }

    tracing::debug!(
        map_type = %scope,
        pois = poi_ids.len(),
        grid_squares = grid_squares.len(),
        comments = comment_ids.len(),
        images = image_ids.len(),
        shared_images = shared_image_ids.len(),
        files = file_urls.len(),
        "discovery complete"
    );

    Ok(ResetPlan {
        scope,
        poi_ids,
        grid_squares,
        comment_ids,
        image_ids,
        shared_image_ids,
        file_urls,
    })
}

/// Candidate images that some POI or comment outside the plan also links to.
fn shared_images(
    store: &dyn DataStore,
    candidates: &[String],
    poi_ids: &[String],
    comment_ids: &[String],
) -> StoreResult<HashSet<String>> {
    let mut shared = HashSet::new();
    if candidates.is_empty() {
        return Ok(shared);
    }
    let own_pois: HashSet<&str> = poi_ids.iter().map(String::as_str).collect();
    let own_comments: HashSet<&str> = comment_ids.iter().map(String::as_str).collect();

    let image_filter = Filter::In("image_id", candidates.to_vec());
    for row in store.select(Table::PoiImageLinks, &["poi_id", "image_id"], &image_filter)? {
        if let (Some(owner), Some(image)) = (row.text("poi_id"), row.text("image_id")) {
            if !own_pois.contains(owner) {
                shared.insert(image.to_string());
            }
        }
    }
    for row in store.select(Table::CommentImageLinks, &["comment_id", "image_id"], &image_filter)? {
        if let (Some(owner), Some(image)) = (row.text("comment_id"), row.text("image_id")) {
            if !own_comments.contains(owner) {
                shared.insert(image.to_string());
            }
        }
    }
    Ok(shared)
}
