//! SQLite-backed [`DataStore`].

use std::collections::HashSet;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};

use super::{DataStore, Filter, Record, StoreError, StoreResult, Table};

/// SQLite caps bound parameters per statement; `IN` lists are split into chunks of this size.
const IN_CHUNK: usize = 500;

const SAVEPOINT: &str = "mapkeeper_ops";

/// [`DataStore`] over a borrowed rusqlite connection.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Expand `filter` into one `(where_clause, params)` pair per chunk.
    fn where_chunks(filter: &Filter) -> Vec<(String, Vec<String>)> {
        match filter {
            Filter::All => vec![(String::new(), Vec::new())],
            Filter::Eq(column, value) => vec![(format!(" WHERE {column} = ?1"), vec![value.clone()])],
            Filter::In(column, values) => values
                .chunks(IN_CHUNK)
                .map(|chunk| {
                    let placeholders = (1..=chunk.len())
                        .map(|i| format!("?{i}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    (format!(" WHERE {column} IN ({placeholders})"), chunk.to_vec())
                })
                .collect(),
        }
    }

    fn table_columns(&self, table: Table) -> StoreResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map([table.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(columns)
    }
}

fn json_to_value(table: Table, column: &str, value: &serde_json::Value) -> StoreResult<SqlValue> {
    let corrupt = |detail: &str| StoreError::Corrupt {
        table: table.as_str(),
        column: column.to_string(),
        detail: detail.to_string(),
    };
    Ok(match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, Some(f)) => SqlValue::Real(f),
            (None, None) => return Err(corrupt("number out of range")),
        },
        serde_json::Value::String(text) => SqlValue::Text(text.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            return Err(corrupt("nested values are not supported"))
        }
    })
}

fn value_to_json(table: Table, column: &str, value: ValueRef<'_>) -> StoreResult<serde_json::Value> {
    Ok(match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| StoreError::Corrupt {
                table: table.as_str(),
                column: column.to_string(),
                detail: e.to_string(),
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(_) => {
            return Err(StoreError::Corrupt {
                table: table.as_str(),
                column: column.to_string(),
                detail: "blob values are not supported".into(),
            })
        }
    })
}

impl DataStore for SqliteStore<'_> {
    fn select(&self, table: Table, columns: &[&str], filter: &Filter) -> StoreResult<Vec<Record>> {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };

        let mut records = Vec::new();
        for (where_clause, values) in Self::where_chunks(filter) {
            let sql = format!("SELECT {projection} FROM {table}{where_clause}");
            let mut stmt = self.conn.prepare(&sql)?;
            let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            while let Some(row) = rows.next()? {
                let mut record = Record::default();
                for (i, name) in names.iter().enumerate() {
                    record.insert(name.clone(), value_to_json(table, name, row.get_ref(i)?)?);
                }
                records.push(record);
            }
        }
        Ok(records)
    }

    fn count(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        let mut total = 0u64;
        for (where_clause, values) in Self::where_chunks(filter) {
            let sql = format!("SELECT COUNT(*) FROM {table}{where_clause}");
            let n: i64 = self
                .conn
                .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            total += n as u64;
        }
        Ok(total)
    }

    fn delete(&self, table: Table, filter: &Filter) -> StoreResult<()> {
        for (where_clause, values) in Self::where_chunks(filter) {
            let sql = format!("DELETE FROM {table}{where_clause}");
            self.conn.execute(&sql, params_from_iter(values.iter()))?;
        }
        Ok(())
    }

    fn insert(&self, table: Table, rows: &[Record]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let known = self.table_columns(table)?;

        let mut inserted = 0u64;
        for row in rows {
            let mut columns = Vec::new();
            let mut values = Vec::new();
            for (column, value) in row.columns() {
                if !known.contains(column) {
                    return Err(StoreError::Corrupt {
                        table: table.as_str(),
                        column: column.clone(),
                        detail: "no such column".into(),
                    });
                }
                columns.push(column.as_str());
                values.push(json_to_value(table, column, value)?);
            }
            if columns.is_empty() {
                continue;
            }
            let placeholders = (1..=columns.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            // Only key conflicts are skipped; CHECK, NOT NULL and FK failures still raise.
            let sql = format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders}) ON CONFLICT DO NOTHING",
                columns.join(", ")
            );
            inserted += self.conn.execute(&sql, params_from_iter(values.iter()))? as u64;
        }
        Ok(inserted)
    }

    fn select_unreferenced_images(&self, image_types: &[&str]) -> StoreResult<Vec<String>> {
        if image_types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=image_types.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id FROM managed_images \
             WHERE image_type IN ({placeholders}) \
             AND id NOT IN (SELECT image_id FROM poi_image_links \
                            UNION SELECT image_id FROM comment_image_links)"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(image_types.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn begin(&self) -> StoreResult<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        self.conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
        Ok(())
    }

    fn rollback(&self) -> StoreResult<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))?;
        Ok(())
    }

    fn log_operation(
        &self,
        operation: &str,
        map_type: &str,
        details: &serde_json::Value,
    ) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO operation_log (operation, map_type, details, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![operation, map_type, details.to_string(), now],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded() -> Connection {
        let conn = db::open_memory_database().unwrap();
        conn.execute_batch(
            "INSERT INTO pois (id, title, map_type, coordinates_x, created_at) VALUES
                ('p1', 'Cave', 'hagga_basin', 12.5, '2024-01-01T00:00:00Z'),
                ('p2', 'Spice field', 'deep_desert', NULL, '2024-01-01T00:00:00Z');
             INSERT INTO managed_images (id, original_url, image_type, created_at) VALUES
                ('i1', 'u1', 'poi_screenshot', '2024-01-01T00:00:00Z'),
                ('i2', 'u2', 'poi_screenshot', '2024-01-01T00:00:00Z'),
                ('i3', 'u3', 'custom_icon', '2024-01-01T00:00:00Z');
             INSERT INTO poi_image_links (poi_id, image_id) VALUES ('p1', 'i1');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn select_with_eq_filter() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let rows = store
            .select(Table::Pois, &["id"], &Filter::Eq("map_type", "hagga_basin".into()))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("id"), Some("p1"));
    }

    #[test]
    fn select_all_columns_preserves_types() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let rows = store
            .select(Table::Pois, &[], &Filter::Eq("id", "p1".into()))
            .unwrap();
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["coordinates_x"], 12.5);
        assert_eq!(json["grid_square_id"], serde_json::Value::Null);
        assert_eq!(json["title"], "Cave");
    }

    #[test]
    fn empty_in_filter_matches_nothing() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        assert_eq!(store.count(Table::Pois, &Filter::In("id", vec![])).unwrap(), 0);
        store.delete(Table::Pois, &Filter::In("id", vec![])).unwrap();
        assert_eq!(store.count(Table::Pois, &Filter::All).unwrap(), 2);
    }

    #[test]
    fn in_filter_spans_chunks() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let mut ids: Vec<String> = (0..1200).map(|i| format!("missing-{i}")).collect();
        ids.push("p2".into());
        assert_eq!(store.count(Table::Pois, &Filter::In("id", ids.clone())).unwrap(), 1);
        assert_eq!(store.select(Table::Pois, &["id"], &Filter::In("id", ids)).unwrap().len(), 1);
    }

    #[test]
    fn unreferenced_images_respect_type_and_links() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let orphans = store
            .select_unreferenced_images(&["poi_screenshot", "comment_image"])
            .unwrap();
        assert_eq!(orphans, vec!["i2".to_string()]);
    }

    #[test]
    fn insert_round_trips_selected_rows_and_skips_existing_keys() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let rows = store.select(Table::Pois, &[], &Filter::All).unwrap();
        store.delete(Table::Pois, &Filter::Eq("id", "p2".into())).unwrap();

        assert_eq!(store.insert(Table::Pois, &rows).unwrap(), 1);
        let again = store.select(Table::Pois, &[], &Filter::All).unwrap();
        assert_eq!(again.len(), 2);
        assert!(again.contains(&rows[1]));
    }

    #[test]
    fn insert_rejects_unknown_columns() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let mut row = Record::default();
        row.insert("id", serde_json::json!("p9"));
        row.insert("title; DROP TABLE pois", serde_json::json!("x"));

        let err = store.insert(Table::Pois, &[row]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(store.count(Table::Pois, &Filter::All).unwrap(), 2);
    }

    #[test]
    fn insert_still_enforces_foreign_keys() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        let mut link = Record::default();
        link.insert("poi_id", serde_json::json!("missing"));
        link.insert("image_id", serde_json::json!("i2"));
        assert!(store.insert(Table::PoiImageLinks, &[link]).is_err());
    }

    #[test]
    fn rollback_restores_deleted_rows() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        store.begin().unwrap();
        store.delete(Table::PoiImageLinks, &Filter::All).unwrap();
        assert_eq!(store.count(Table::PoiImageLinks, &Filter::All).unwrap(), 0);
        store.rollback().unwrap();
        assert_eq!(store.count(Table::PoiImageLinks, &Filter::All).unwrap(), 1);
    }

    #[test]
    fn log_operation_appends_row() {
        let conn = seeded();
        let store = SqliteStore::new(&conn);
        store
            .log_operation("reset", "hagga_basin", &serde_json::json!({"deletedRecords": 3}))
            .unwrap();
        let (op, details): (String, String) = conn
            .query_row(
                "SELECT operation, details FROM operation_log WHERE map_type = 'hagga_basin'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(op, "reset");
        let details: serde_json::Value = serde_json::from_str(&details).unwrap();
        assert_eq!(details["deletedRecords"], 3);
    }
}
