//! Paginated full-table reads.

use crate::datastore::{Datastore, Row};
use crate::error::{Result, VaultError};
use tracing::debug;

/// Drains tables page by page.
///
/// Pages are read by offset in conflict-key order. Rows inserted or deleted
/// while a table is being drained may be missed or read twice; no snapshot is
/// taken across pages.
#[derive(Debug, Clone, Copy)]
pub struct TableExtractor {
    page_size: usize,
}

impl TableExtractor {
    /// Create an extractor reading `page_size` rows per round trip
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// Rows per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read every row of `table`, stopping at the first short page
    pub async fn extract_all(
        &self,
        datastore: &dyn Datastore,
        table: &str,
        order_by: &[&str],
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let page = datastore
                .fetch_page(table, order_by, offset, self.page_size)
                .await
                .map_err(|e| VaultError::extraction(table, e.to_string()))?;

            let fetched = page.len();
            rows.extend(page);
            offset += fetched;

            debug!(table = %table, offset, fetched, "Fetched page");

            if fetched < self.page_size {
                break;
            }
        }

        Ok(rows)
    }
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatastore;
    use crate::registry::ModuleRegistry;
    use serde_json::json;

    async fn seeded_store(count: usize) -> MemoryDatastore {
        let store = MemoryDatastore::new(ModuleRegistry::standard());
        let rows: Vec<Row> = (0..count)
            .map(|i| {
                json!({"id": format!("r-{:04}", i), "name": format!("Role {}", i)})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect();
        store.seed("roles", rows).await;
        store
    }

    #[tokio::test]
    async fn test_extract_drains_multiple_pages() -> Result<()> {
        let store = seeded_store(25).await;
        let extractor = TableExtractor::new(10);

        let rows = extractor.extract_all(&store, "roles", &["id"]).await?;
        assert_eq!(rows.len(), 25);
        assert_eq!(rows[0]["id"], "r-0000");
        assert_eq!(rows[24]["id"], "r-0024");
        assert_eq!(store.page_reads("roles").await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_exact_multiple_reads_trailing_empty_page() -> Result<()> {
        let store = seeded_store(20).await;
        let extractor = TableExtractor::new(10);

        let rows = extractor.extract_all(&store, "roles", &["id"]).await?;
        assert_eq!(rows.len(), 20);
        assert_eq!(store.page_reads("roles").await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_empty_table() -> Result<()> {
        let store = seeded_store(0).await;
        let rows = TableExtractor::default()
            .extract_all(&store, "roles", &["id"])
            .await?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_extract_failure_names_table() {
        let store = seeded_store(5).await;
        store.fail_reads("roles").await;

        let err = TableExtractor::new(2)
            .extract_all(&store, "roles", &["id"])
            .await
            .unwrap_err();
        match err {
            VaultError::Extraction { table, .. } => assert_eq!(table, "roles"),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }
}
