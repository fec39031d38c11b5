//! Data-store capability used by the reset, backup and inventory operations.
//!
//! [`DataStore`] is the narrow interface those operations need: filtered selects,
//! counts, deletes, inserts for restore, one anti-join for orphan detection, and
//! a savepoint. The SQLite
//! implementation lives in [`sqlite`]; tests can supply their own.

pub mod sqlite;

use serde::{Deserialize, Serialize};

pub use sqlite::SqliteStore;

/// Errors raised by a [`DataStore`]. None of these are recovered by callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unexpected data in {table}.{column}: {detail}")]
    Corrupt {
        table: &'static str,
        column: String,
        detail: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The map tables the service reads and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    GridSquares,
    Pois,
    Comments,
    ManagedImages,
    PoiImageLinks,
    CommentImageLinks,
    PoiEntityLinks,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GridSquares => "grid_squares",
            Self::Pois => "pois",
            Self::Comments => "comments",
            Self::ManagedImages => "managed_images",
            Self::PoiImageLinks => "poi_image_links",
            Self::CommentImageLinks => "comment_image_links",
            Self::PoiEntityLinks => "poi_entity_links",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter for select, count and delete. Column names are fixed identifiers
/// chosen by this crate, never caller input.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(&'static str, String),
    /// Matches nothing when the value list is empty.
    In(&'static str, Vec<String>),
}

impl Filter {
    pub fn is_empty_in(&self) -> bool {
        matches!(self, Filter::In(_, values) if values.is_empty())
    }
}

/// One selected row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(serde_json::Map<String, serde_json::Value>);

impl Record {
    pub fn new(values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(values)
    }

    /// Text value of `column`, or `None` if absent, NULL or not text.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(|v| v.as_str())
    }

    /// Like [`Record::text`] but NULL and empty strings are both `None`.
    pub fn non_empty_text(&self, column: &str) -> Option<&str> {
        self.text(column).filter(|s| !s.is_empty())
    }

    pub fn insert(&mut self, column: impl Into<String>, value: serde_json::Value) {
        self.0.insert(column.into(), value);
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Synchronous data-store capability.
///
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`. Savepoint methods nest: each `begin` must be
/// paired with exactly one `commit` or `rollback`.
pub trait DataStore {
    /// Select `columns` (or every column when `columns` is empty) from rows matching `filter`.
    fn select(&self, table: Table, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Record>>;

    fn count(&self, table: Table, filter: &Filter) -> StoreResult<u64>;

    /// Delete rows matching `filter`. Bulk deletes do not report affected rows;
    /// callers count first.
    fn delete(&self, table: Table, filter: &Filter) -> StoreResult<()>;

    /// Insert `rows` into `table`, leaving any row whose key already exists
    /// untouched. Every column of every row must exist in `table`. Returns how many
    /// rows were inserted.
    fn insert(&self, table: Table, rows: &[Record]) -> StoreResult<u64>;

    /// Ids of images whose `image_type` is in `image_types` and which no row of
    /// either image-link table references, evaluated against current state.
    fn select_unreferenced_images(&self, image_types: &[&str]) -> StoreResult<Vec<String>>;

    fn begin(&self) -> StoreResult<()>;
    fn commit(&self) -> StoreResult<()>;
    fn rollback(&self) -> StoreResult<()>;

    /// Append an entry to the operation log.
    fn log_operation(
        &self,
        operation: &str,
        map_type: &str,
        details: &serde_json::Value,
    ) -> StoreResult<()>;
}

/// Select a single text column and return its non-null values.
pub fn select_texts(
    store: &dyn DataStore,
    table: Table,
    column: &'static str,
    filter: &Filter,
) -> StoreResult<Vec<String>> {
    if filter.is_empty_in() {
        return Ok(Vec::new());
    }
    let rows = store.select(table, &[column], filter)?;
    Ok(rows
        .iter()
        .filter_map(|r| r.text(column).map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_text_ignores_nulls_and_numbers() {
        let mut record = Record::default();
        record.insert("id", json!("abc"));
        record.insert("processed_url", serde_json::Value::Null);
        record.insert("display_order", json!(2));
        record.insert("original_url", json!(""));

        assert_eq!(record.text("id"), Some("abc"));
        assert_eq!(record.text("processed_url"), None);
        assert_eq!(record.text("display_order"), None);
        assert_eq!(record.text("missing"), None);
        assert_eq!(record.text("original_url"), Some(""));
        assert_eq!(record.non_empty_text("original_url"), None);
    }

    #[test]
    fn empty_in_filter_is_detected() {
        assert!(Filter::In("id", vec![]).is_empty_in());
        assert!(!Filter::In("id", vec!["a".into()]).is_empty_in());
        assert!(!Filter::All.is_empty_in());
    }

    #[test]
    fn table_names_match_schema() {
        assert_eq!(Table::PoiEntityLinks.to_string(), "poi_entity_links");
        assert_eq!(Table::CommentImageLinks.as_str(), "comment_image_links");
    }
}
