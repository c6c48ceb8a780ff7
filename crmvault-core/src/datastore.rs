//! Relational datastore seam used by extraction and restore.

use crate::error::DatastoreError;
use async_trait::async_trait;

/// One table row, column name to JSON value, in column order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Result type for datastore operations
pub type DatastoreResult<T> = std::result::Result<T, DatastoreError>;

/// Per-table access to the relational datastore
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Read up to `limit` rows starting at `offset`, ordered by `order_by`
    async fn fetch_page(
        &self,
        table: &str,
        order_by: &[&str],
        offset: usize,
        limit: usize,
    ) -> DatastoreResult<Vec<Row>>;

    /// Delete every row whose `guard_column` is not null, returning the count
    async fn delete_all(&self, table: &str, guard_column: &str) -> DatastoreResult<u64>;

    /// Insert rows as-is
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DatastoreResult<u64>;

    /// Insert rows, updating existing rows that share the conflict key
    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: &[&str],
    ) -> DatastoreResult<u64>;
}

/// Columns present in any of the rows, in order of first appearance
pub fn column_union(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for column in row.keys() {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.clone());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_column_union_keeps_first_appearance_order() {
        let rows = vec![
            row(json!({"id": 1, "name": "Acme"})),
            row(json!({"id": 2, "email": "a@b.c", "name": "Globex"})),
        ];
        assert_eq!(column_union(&rows), vec!["id", "name", "email"]);
    }

    #[test]
    fn test_column_union_of_nothing() {
        assert!(column_union(&[]).is_empty());
    }
}
