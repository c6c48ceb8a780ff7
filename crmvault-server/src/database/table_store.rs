//! The CRM's own tables, read and written generically as JSON rows

use crate::database::error::table_error;
use async_trait::async_trait;
use crmvault_core::{column_union, Datastore, DatastoreError, DatastoreResult, ModuleRegistry, Row};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;

/// Datastore over a PostgreSQL database holding the registry's tables.
///
/// Rows travel as JSON objects: reads go through `row_to_json`, writes
/// through `jsonb_populate_recordset`, so column types come from the table
/// definitions. Only tables the registry knows are accepted.
#[derive(Debug, Clone)]
pub struct PgDatastore {
    pool: PgPool,
    registry: &'static ModuleRegistry,
}

impl PgDatastore {
    pub fn new(pool: PgPool, registry: &'static ModuleRegistry) -> Self {
        Self { pool, registry }
    }

    fn check_table(&self, table: &str) -> DatastoreResult<()> {
        if self.registry.is_registered(table) {
            Ok(())
        } else {
            Err(DatastoreError::UnknownTable {
                table: table.to_string(),
            })
        }
    }

    async fn write(&self, table: &str, rows: &[Row], conflict_key: Option<&[&str]>) -> DatastoreResult<u64> {
        self.check_table(table)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let columns = column_union(rows);
        let sql = insert_sql(table, &columns, conflict_key);

        let result = sqlx::query(&sql)
            .bind(Json(rows))
            .execute(&self.pool)
            .await
            .map_err(|e| table_error(table, e))?;

        debug!(table = %table, rows = rows.len(), affected = result.rows_affected(), "Wrote rows");
        Ok(rows.len() as u64)
    }
}

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Paged read in key order; `$1` is the limit, `$2` the offset
pub fn select_page_sql(table: &str, order_by: &[&str]) -> String {
    let order = if order_by.is_empty() {
        String::new()
    } else {
        format!(
            " ORDER BY {}",
            order_by
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    format!(
        "SELECT row_to_json(t)::jsonb FROM (SELECT * FROM {}{} LIMIT $1 OFFSET $2) t",
        quote_ident(table),
        order
    )
}

/// Batch insert from a JSON array bound as `$1`, upserting when a conflict key is given
pub fn insert_sql(table: &str, columns: &[String], conflict_key: Option<&[&str]>) -> String {
    let table_ident = quote_ident(table);
    let column_idents = column_list(columns);
    let mut sql = format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM jsonb_populate_recordset(NULL::{table}, $1::jsonb)",
        table = table_ident,
        cols = column_idents
    );

    if let Some(key) = conflict_key {
        let key_idents = key.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !key.contains(&c.as_str()))
            .map(|c| format!("{col} = EXCLUDED.{col}", col = quote_ident(c)))
            .collect();
        if updates.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", key_idents));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                key_idents,
                updates.join(", ")
            ));
        }
    }

    sql
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn fetch_page(
        &self,
        table: &str,
        order_by: &[&str],
        offset: usize,
        limit: usize,
    ) -> DatastoreResult<Vec<Row>> {
        self.check_table(table)?;

        let rows: Vec<Json<Row>> = sqlx::query_scalar(&select_page_sql(table, order_by))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| table_error(table, e))?;

        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn delete_all(&self, table: &str, guard_column: &str) -> DatastoreResult<u64> {
        self.check_table(table)?;

        let sql = format!(
            "DELETE FROM {} WHERE {} IS NOT NULL",
            quote_ident(table),
            quote_ident(guard_column)
        );
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| table_error(table, e))?;

        Ok(result.rows_affected())
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DatastoreResult<u64> {
        self.write(table, rows, None).await
    }

    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: &[&str],
    ) -> DatastoreResult<u64> {
        self.write(table, rows, Some(conflict_key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("leads"), "\"leads\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_select_page_sql() {
        assert_eq!(
            select_page_sql("user_roles", &["user_id", "role_id"]),
            "SELECT row_to_json(t)::jsonb FROM (SELECT * FROM \"user_roles\" ORDER BY \"user_id\", \"role_id\" LIMIT $1 OFFSET $2) t"
        );
    }

    #[test]
    fn test_insert_sql_plain() {
        let sql = insert_sql("leads", &["id".into(), "name".into()], None);
        assert_eq!(
            sql,
            "INSERT INTO \"leads\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM jsonb_populate_recordset(NULL::\"leads\", $1::jsonb)"
        );
    }

    #[test]
    fn test_insert_sql_upsert() {
        let sql = insert_sql("app_settings", &["key".into(), "value".into()], Some(&["key"][..]));
        assert!(sql.ends_with("ON CONFLICT (\"key\") DO UPDATE SET \"value\" = EXCLUDED.\"value\""));

        let sql = insert_sql("user_roles", &["user_id".into(), "role_id".into()], Some(&["user_id", "role_id"][..]));
        assert!(sql.ends_with("ON CONFLICT (\"user_id\", \"role_id\") DO NOTHING"));
    }
}
