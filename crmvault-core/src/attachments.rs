//! Best-effort copy of attachment objects into a job's backup area.

use crate::bundle::{FileManifest, ManifestEntry};
use crate::crypto::content_checksum;
use crate::datastore::Row;
use crate::error::FileWarning;
use crate::jobs::FileBackupStats;
use crate::registry::ModuleRegistry;
use crate::storage::{validate_object_path, ObjectStore};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Object key of a copied attachment: `backups/<job>/files/<bucket>/<path>`
pub fn attachment_backup_path(job_id: Uuid, bucket: &str, original_path: &str) -> String {
    format!(
        "backups/{}/files/{}/{}",
        job_id,
        bucket.trim_matches('/'),
        original_path.trim_start_matches('/')
    )
}

/// A referenced object in primary storage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttachmentRef {
    pub bucket: String,
    pub path: String,
}

/// What a migration run produced
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    pub manifest: FileManifest,
    pub stats: FileBackupStats,
    pub warnings: Vec<FileWarning>,
}

/// Copies attachment objects referenced by extracted rows
pub struct AttachmentMigrator {
    registry: &'static ModuleRegistry,
    storage: Arc<dyn ObjectStore>,
    primary_bucket: String,
    backup_bucket: String,
}

impl AttachmentMigrator {
    pub fn new(
        registry: &'static ModuleRegistry,
        storage: Arc<dyn ObjectStore>,
        primary_bucket: impl Into<String>,
        backup_bucket: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            storage,
            primary_bucket: primary_bucket.into(),
            backup_bucket: backup_bucket.into(),
        }
    }

    /// Distinct object references across every attachment-bearing table.
    ///
    /// Rows with a null, empty or non-string path are ignored. A missing or
    /// empty bucket column falls back to the primary bucket.
    pub fn collect_references(&self, tables: &BTreeMap<String, Vec<Row>>) -> BTreeSet<AttachmentRef> {
        let mut refs = BTreeSet::new();

        for (table, rows) in tables {
            let Some(source) = self.registry.attachment_source(table) else {
                continue;
            };

            for row in rows {
                let path = match row.get(source.path_column) {
                    Some(Value::String(p)) if !p.trim().is_empty() => p.trim().to_string(),
                    _ => continue,
                };
                let bucket = source
                    .bucket_column
                    .and_then(|column| row.get(column))
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .unwrap_or(&self.primary_bucket)
                    .to_string();
                refs.insert(AttachmentRef { bucket, path });
            }
        }

        refs
    }

    /// Copy every referenced object, recording one manifest entry per reference
    pub async fn migrate(&self, job_id: Uuid, tables: &BTreeMap<String, Vec<Row>>) -> MigrationOutcome {
        let mut outcome = MigrationOutcome::default();

        for reference in self.collect_references(tables) {
            let backup_path = attachment_backup_path(job_id, &reference.bucket, &reference.path);
            outcome.stats.attempted += 1;

            match self.copy(&reference, &backup_path).await {
                Ok((content_type, checksum)) => {
                    debug!(job_id = %job_id, path = %reference.path, "Copied attachment");
                    outcome.stats.copied += 1;
                    outcome.manifest.manifest.push(ManifestEntry {
                        original_bucket: reference.bucket,
                        original_path: reference.path,
                        backup_path,
                        copied: true,
                        content_type: Some(content_type),
                        checksum: Some(checksum),
                        error: None,
                    });
                }
                Err(reason) => {
                    warn!(job_id = %job_id, path = %reference.path, reason = %reason, "Attachment not copied");
                    outcome.stats.failed += 1;
                    outcome.warnings.push(FileWarning::MigrationFailed {
                        path: reference.path.clone(),
                        reason: reason.clone(),
                    });
                    outcome.manifest.manifest.push(ManifestEntry {
                        original_bucket: reference.bucket,
                        original_path: reference.path,
                        backup_path,
                        copied: false,
                        content_type: None,
                        checksum: None,
                        error: Some(reason),
                    });
                }
            }
        }

        outcome
    }

    async fn copy(&self, reference: &AttachmentRef, backup_path: &str) -> Result<(String, String), String> {
        validate_object_path(&reference.path).map_err(|e| e.to_string())?;
        validate_object_path(backup_path).map_err(|e| e.to_string())?;

        let object = self
            .storage
            .get(&reference.bucket, &reference.path)
            .await
            .map_err(|e| format!("download failed: {}", e))?;

        self.storage
            .put(
                &self.backup_bucket,
                backup_path,
                &object.bytes,
                &object.content_type,
                true,
            )
            .await
            .map_err(|e| format!("upload failed: {}", e))?;

        Ok((object.content_type, content_checksum(&object.bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::memory::MemoryObjectStore;
    use crate::storage::{MockObjectStore, StoredObject};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn tables() -> BTreeMap<String, Vec<Row>> {
        let mut tables = BTreeMap::new();
        tables.insert(
            "lead_attachments".to_string(),
            vec![
                row(json!({"id": "a1", "file_path": "leads/1/quote.pdf", "bucket": "crm-files"})),
                row(json!({"id": "a2", "file_path": "leads/1/quote.pdf"})),
                row(json!({"id": "a3", "file_path": ""})),
                row(json!({"id": "a4", "file_path": null})),
            ],
        );
        tables.insert(
            "task_attachments".to_string(),
            vec![
                row(json!({"id": "t1", "file_path": "tasks/9/photo.png", "bucket": ""})),
                row(json!({"id": "t2", "file_path": "leads/1/quote.pdf"})),
            ],
        );
        tables.insert(
            "leads".to_string(),
            vec![row(json!({"id": "l1", "file_path": "not/an/attachment.txt"}))],
        );
        tables
    }

    fn migrator(storage: Arc<dyn ObjectStore>) -> AttachmentMigrator {
        AttachmentMigrator::new(ModuleRegistry::standard(), storage, "crm-files", "crm-backups")
    }

    #[test]
    fn test_collect_references_dedupes_across_tables() {
        let refs = migrator(Arc::new(MemoryObjectStore::default())).collect_references(&tables());
        let paths: Vec<&str> = refs.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["leads/1/quote.pdf", "tasks/9/photo.png"]);
        assert!(refs.iter().all(|r| r.bucket == "crm-files"));
    }

    #[tokio::test]
    async fn test_migrate_records_failures_and_continues() {
        let storage = Arc::new(MemoryObjectStore::default());
        storage
            .put("crm-files", "leads/1/quote.pdf", b"%PDF", "application/pdf", true)
            .await
            .unwrap();

        let job_id = Uuid::new_v4();
        let outcome = migrator(storage.clone()).migrate(job_id, &tables()).await;

        assert_eq!(outcome.stats, FileBackupStats { attempted: 2, copied: 1, failed: 1 });
        assert_eq!(outcome.manifest.manifest.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);

        let copied = outcome.manifest.copied().next().unwrap();
        assert_eq!(copied.backup_path, format!("backups/{}/files/crm-files/leads/1/quote.pdf", job_id));
        assert_eq!(copied.checksum.as_deref(), Some(content_checksum(b"%PDF").as_str()));
        let stored = storage.get("crm-backups", &copied.backup_path).await.unwrap();
        assert_eq!(stored.content_type, "application/pdf");

        let failed = outcome.manifest.failed().next().unwrap();
        assert_eq!(failed.original_path, "tasks/9/photo.png");
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn test_same_path_in_two_buckets_keeps_both_copies() {
        let storage = Arc::new(MemoryObjectStore::default());
        storage.put("bucket-a", "docs/x.pdf", b"AAA", "application/pdf", true).await.unwrap();
        storage.put("bucket-b", "docs/x.pdf", b"BBB", "application/pdf", true).await.unwrap();

        let mut tables = BTreeMap::new();
        tables.insert(
            "lead_attachments".to_string(),
            vec![
                row(json!({"id": "a1", "file_path": "docs/x.pdf", "bucket": "bucket-a"})),
                row(json!({"id": "a2", "file_path": "docs/x.pdf", "bucket": "bucket-b"})),
            ],
        );

        let job_id = Uuid::new_v4();
        let outcome = migrator(storage.clone()).migrate(job_id, &tables).await;
        assert_eq!(outcome.stats, FileBackupStats { attempted: 2, copied: 2, failed: 0 });
        assert_eq!(storage.paths("crm-backups").await.len(), 2);

        for entry in &outcome.manifest.manifest {
            let stored = storage.get("crm-backups", &entry.backup_path).await.unwrap();
            assert_eq!(entry.checksum.as_deref(), Some(content_checksum(&stored.bytes).as_str()));
            let expected: &[u8] = if entry.original_bucket == "bucket-a" { b"AAA" } else { b"BBB" };
            assert_eq!(stored.bytes, expected);
        }
    }

    #[test]
    fn test_backup_path_includes_bucket() {
        let job_id = Uuid::nil();
        assert_eq!(
            attachment_backup_path(job_id, "crm-files", "/leads/1/a.pdf"),
            format!("backups/{}/files/crm-files/leads/1/a.pdf", job_id)
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_recorded() {
        let mut storage = MockObjectStore::new();
        storage
            .expect_get()
            .returning(|_, _| Ok(StoredObject::new(b"bytes".to_vec(), "image/png")));
        storage.expect_put().returning(|bucket, path, _, _, _| {
            Err(StorageError::Backend {
                backend: "mock".into(),
                message: format!("{}/{} rejected", bucket, path),
            })
        });

        let outcome = migrator(Arc::new(storage)).migrate(Uuid::new_v4(), &tables()).await;
        assert_eq!(outcome.stats.copied, 0);
        assert_eq!(outcome.stats.failed, 2);
        assert!(outcome
            .manifest
            .manifest
            .iter()
            .all(|e| e.error.as_deref().is_some_and(|m| m.starts_with("upload failed"))));
    }
}
