//! In-memory backends for the datastore, object store and job store.
//!
//! The datastore enforces the registry's declared foreign keys and conflict
//! keys the way a relational database would, and records every read, delete
//! and write so callers can inspect the order of operations.

use crate::crypto::UrlSigner;
use crate::datastore::{Datastore, DatastoreResult, Row};
use crate::error::{DatastoreError, Result, StorageError, VaultError};
use crate::jobs::{BackupJob, JobStatus, JobStore, RestoreJob};
use crate::registry::ModuleRegistry;
use crate::storage::{validate_object_path, ObjectStore, StorageResult, StoredObject};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A datastore call, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatastoreOp {
    Read(String),
    Delete(String),
    Write(String),
}

#[derive(Default)]
struct TableState {
    tables: HashMap<String, Vec<Row>>,
    log: Vec<DatastoreOp>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
}

/// Relational datastore held in memory
pub struct MemoryDatastore {
    registry: &'static ModuleRegistry,
    state: RwLock<TableState>,
}

impl MemoryDatastore {
    /// Create an empty datastore knowing every table of `registry`
    pub fn new(registry: &'static ModuleRegistry) -> Self {
        let tables = registry
            .all_tables()
            .into_iter()
            .map(|table| (table, Vec::new()))
            .collect();
        Self {
            registry,
            state: RwLock::new(TableState {
                tables,
                ..Default::default()
            }),
        }
    }

    /// Load rows without constraint checks or logging
    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut state = self.state.write().await;
        state.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current rows of a table
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.read().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Current row count of a table
    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.read().await;
        state.tables.get(table).map(Vec::len).unwrap_or(0)
    }

    /// Every operation performed so far
    pub async fn operations(&self) -> Vec<DatastoreOp> {
        self.state.read().await.log.clone()
    }

    /// Tables deleted from, in order
    pub async fn delete_sequence(&self) -> Vec<String> {
        self.operations()
            .await
            .into_iter()
            .filter_map(|op| match op {
                DatastoreOp::Delete(table) => Some(table),
                _ => None,
            })
            .collect()
    }

    /// Number of pages read from a table
    pub async fn page_reads(&self, table: &str) -> usize {
        self.operations()
            .await
            .iter()
            .filter(|op| matches!(op, DatastoreOp::Read(t) if t == table))
            .count()
    }

    /// Make every read of `table` fail
    pub async fn fail_reads(&self, table: &str) {
        self.state.write().await.failing_reads.insert(table.to_string());
    }

    /// Make every delete and write of `table` fail
    pub async fn fail_writes(&self, table: &str) {
        self.state.write().await.failing_writes.insert(table.to_string());
    }

    fn known<'a>(state: &'a TableState, table: &str) -> DatastoreResult<&'a Vec<Row>> {
        state.tables.get(table).ok_or_else(|| DatastoreError::UnknownTable {
            table: table.to_string(),
        })
    }

    fn check_writable(state: &TableState, table: &str) -> DatastoreResult<()> {
        Self::known(state, table)?;
        if state.failing_writes.contains(table) {
            return Err(DatastoreError::Connection {
                message: format!("write to '{}' refused", table),
            });
        }
        Ok(())
    }

    /// Every non-null foreign key value in `rows` must exist in its parent
    fn check_parents(&self, state: &TableState, table: &str, rows: &[Row]) -> DatastoreResult<()> {
        for fk in self.registry.foreign_keys.iter().filter(|fk| fk.table == table) {
            for row in rows {
                let value = match row.get(fk.column) {
                    None | Some(Value::Null) => continue,
                    Some(value) => value,
                };
                let in_parent = state
                    .tables
                    .get(fk.references)
                    .map(|parents| parents.iter().any(|p| p.get(fk.references_column) == Some(value)))
                    .unwrap_or(false);
                let in_batch = fk.references == table
                    && rows.iter().any(|r| r.get(fk.references_column) == Some(value));
                if !in_parent && !in_batch {
                    return Err(DatastoreError::ForeignKeyViolation {
                        table: table.to_string(),
                        message: format!(
                            "insert or update on table \"{}\" violates foreign key \"{}.{}\": key {} is not present in table \"{}\"",
                            table, fk.table, fk.column, value, fk.references
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn key_of(row: &Row, columns: &[&str]) -> Vec<String> {
        columns
            .iter()
            .map(|c| row.get(*c).map(Value::to_string).unwrap_or_else(|| "null".to_string()))
            .collect()
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn fetch_page(
        &self,
        table: &str,
        order_by: &[&str],
        offset: usize,
        limit: usize,
    ) -> DatastoreResult<Vec<Row>> {
        let mut state = self.state.write().await;
        state.log.push(DatastoreOp::Read(table.to_string()));

        if state.failing_reads.contains(table) {
            return Err(DatastoreError::query(table, "read refused"));
        }

        let mut rows = Self::known(&state, table)?.clone();
        rows.sort_by(|a, b| {
            order_by
                .iter()
                .map(|c| compare_values(a.get(*c), b.get(*c)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_all(&self, table: &str, guard_column: &str) -> DatastoreResult<u64> {
        let mut state = self.state.write().await;
        state.log.push(DatastoreOp::Delete(table.to_string()));
        Self::check_writable(&state, table)?;

        let doomed: Vec<&Row> = state.tables[table]
            .iter()
            .filter(|row| !matches!(row.get(guard_column), None | Some(Value::Null)))
            .collect();

        for fk in self
            .registry
            .foreign_keys
            .iter()
            .filter(|fk| fk.references == table && fk.table != table)
        {
            let children = state.tables.get(fk.table).map(Vec::as_slice).unwrap_or(&[]);
            let referenced = children.iter().find_map(|child| {
                let value = child.get(fk.column).filter(|v| !v.is_null())?;
                doomed
                    .iter()
                    .any(|parent| parent.get(fk.references_column) == Some(value))
                    .then(|| value.clone())
            });
            if let Some(value) = referenced {
                return Err(DatastoreError::ForeignKeyViolation {
                    table: table.to_string(),
                    message: format!(
                        "update or delete on table \"{}\" violates foreign key \"{}.{}\": key {} is still referenced",
                        table, fk.table, fk.column, value
                    ),
                });
            }
        }

        let rows = state.tables.get_mut(table).map(std::mem::take).unwrap_or_default();
        let (kept, deleted): (Vec<Row>, Vec<Row>) = rows
            .into_iter()
            .partition(|row| matches!(row.get(guard_column), None | Some(Value::Null)));
        state.tables.insert(table.to_string(), kept);
        Ok(deleted.len() as u64)
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DatastoreResult<u64> {
        let mut state = self.state.write().await;
        state.log.push(DatastoreOp::Write(table.to_string()));
        Self::check_writable(&state, table)?;
        self.check_parents(&state, table, rows)?;

        let key_columns = self.registry.conflict_key(table);
        let mut keys: HashSet<Vec<String>> = state.tables[table]
            .iter()
            .map(|row| Self::key_of(row, key_columns))
            .collect();
        for row in rows {
            if !keys.insert(Self::key_of(row, key_columns)) {
                return Err(DatastoreError::UniqueViolation {
                    table: table.to_string(),
                    message: format!(
                        "duplicate key value violates unique constraint on ({})",
                        key_columns.join(", ")
                    ),
                });
            }
        }

        if let Some(existing) = state.tables.get_mut(table) {
            existing.extend(rows.iter().cloned());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_rows(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: &[&str],
    ) -> DatastoreResult<u64> {
        let mut state = self.state.write().await;
        state.log.push(DatastoreOp::Write(table.to_string()));
        Self::check_writable(&state, table)?;
        self.check_parents(&state, table, rows)?;

        if let Some(existing) = state.tables.get_mut(table) {
            for row in rows {
                let key = Self::key_of(row, conflict_key);
                match existing
                    .iter_mut()
                    .find(|current| Self::key_of(current, conflict_key) == key)
                {
                    Some(current) => {
                        for (column, value) in row {
                            current.insert(column.clone(), value.clone());
                        }
                    }
                    None => existing.push(row.clone()),
                }
            }
        }
        Ok(rows.len() as u64)
    }
}

/// Object store held in memory
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    pub fn new(signer: UrlSigner) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signer,
        }
    }

    /// Remove an object, returning whether it existed
    pub async fn remove(&self, bucket: &str, path: &str) -> bool {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), path.to_string()))
            .is_some()
    }

    /// Paths stored in a bucket, sorted
    pub async fn paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new(UrlSigner::new("memory", "memory://objects"))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(bucket, path))
    }

    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> StorageResult<()> {
        validate_object_path(path)?;
        let mut objects = self.objects.write().await;
        let key = (bucket.to_string(), path.to_string());
        if !overwrite && objects.contains_key(&key) {
            return Err(StorageError::already_exists(bucket, path));
        }
        objects.insert(key, StoredObject::new(bytes.to_vec(), content_type));
        Ok(())
    }

    async fn exists(&self, bucket: &str, path: &str) -> StorageResult<bool> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), path.to_string())))
    }

    fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> StorageResult<String> {
        Ok(self.signer.sign_url(bucket, path, ttl, Utc::now()))
    }
}

/// Job store held in memory
#[derive(Default)]
pub struct MemoryJobStore {
    backups: RwLock<Vec<BackupJob>>,
    restores: RwLock<Vec<RestoreJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn finish<T: Clone>(
    jobs: &mut [T],
    id: Uuid,
    job: &T,
    id_of: impl Fn(&T) -> Uuid,
    status_of: impl Fn(&T) -> JobStatus,
) -> Result<()> {
    let slot = jobs
        .iter_mut()
        .find(|j| id_of(j) == id)
        .ok_or_else(|| VaultError::not_found("Job", id.to_string()))?;
    if status_of(slot).is_terminal() {
        return Err(VaultError::persistence(format!(
            "Job {} already finished with status {}",
            id,
            status_of(slot)
        )));
    }
    *slot = job.clone();
    Ok(())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_backup_job(&self, job: &BackupJob) -> Result<()> {
        self.backups.write().await.push(job.clone());
        Ok(())
    }

    async fn finish_backup_job(&self, job: &BackupJob) -> Result<()> {
        let mut jobs = self.backups.write().await;
        finish(&mut jobs, job.id, job, |j| j.id, |j| j.status)
    }

    async fn get_backup_job(&self, id: Uuid) -> Result<Option<BackupJob>> {
        Ok(self.backups.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn list_backup_jobs(&self, limit: usize) -> Result<Vec<BackupJob>> {
        let mut jobs = self.backups.read().await.clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn insert_restore_job(&self, job: &RestoreJob) -> Result<()> {
        self.restores.write().await.push(job.clone());
        Ok(())
    }

    async fn finish_restore_job(&self, job: &RestoreJob) -> Result<()> {
        let mut jobs = self.restores.write().await;
        finish(&mut jobs, job.id, job, |j| j.id, |j| j.status)
    }

    async fn get_restore_job(&self, id: Uuid) -> Result<Option<RestoreJob>> {
        Ok(self.restores.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn list_restore_jobs(&self, limit: usize) -> Result<Vec<RestoreJob>> {
        let mut jobs = self.restores.read().await.clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::BackupSummary;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_requires_parent() {
        let store = MemoryDatastore::new(ModuleRegistry::standard());
        let err = store
            .insert_rows("tasks", &[row(json!({"id": "t1", "lead_id": "missing"}))])
            .await
            .unwrap_err();
        assert!(err.is_foreign_key_violation());
        assert_eq!(store.row_count("tasks").await, 0);
    }

    #[tokio::test]
    async fn test_delete_blocked_by_children() -> DatastoreResult<()> {
        let store = MemoryDatastore::new(ModuleRegistry::standard());
        store.insert_rows("leads", &[row(json!({"id": "l1"}))]).await?;
        store
            .insert_rows("tasks", &[row(json!({"id": "t1", "lead_id": "l1"}))])
            .await?;

        let err = store.delete_all("leads", "id").await.unwrap_err();
        assert!(err.is_foreign_key_violation());
        assert_eq!(store.row_count("leads").await, 1);

        assert_eq!(store.delete_all("tasks", "id").await?, 1);
        assert_eq!(store.delete_all("leads", "id").await?, 1);
        assert_eq!(store.delete_sequence().await, vec!["leads", "tasks", "leads"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_keys() -> DatastoreResult<()> {
        let store = MemoryDatastore::new(ModuleRegistry::standard());
        store.insert_rows("roles", &[row(json!({"id": "r1"}))]).await?;
        let err = store
            .insert_rows("roles", &[row(json!({"id": "r1"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, DatastoreError::UniqueViolation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_updates_by_conflict_key() -> DatastoreResult<()> {
        let store = MemoryDatastore::new(ModuleRegistry::standard());
        store
            .upsert_rows("app_settings", &[row(json!({"key": "currency", "value": "EUR"}))], &["key"])
            .await?;
        store
            .upsert_rows("app_settings", &[row(json!({"key": "currency", "value": "USD"}))], &["key"])
            .await?;

        let rows = store.rows("app_settings").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["value"], "USD");
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let store = MemoryDatastore::new(ModuleRegistry::standard());
        let err = store.fetch_page("invoices", &["id"], 0, 10).await.unwrap_err();
        assert!(matches!(err, DatastoreError::UnknownTable { .. }));
    }

    #[tokio::test]
    async fn test_memory_object_store() -> StorageResult<()> {
        let store = MemoryObjectStore::default();
        store.put("b", "x/y.txt", b"hi", "text/plain", false).await?;
        assert!(store.put("b", "x/y.txt", b"again", "text/plain", false).await.unwrap_err().is_already_exists());
        assert_eq!(store.get("b", "x/y.txt").await?.content_type, "text/plain");
        assert!(store.remove("b", "x/y.txt").await);
        assert!(store.get("b", "x/y.txt").await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_job_store_refuses_second_transition() -> Result<()> {
        let store = MemoryJobStore::new();
        let mut job = BackupJob::start("admin", vec![]);
        store.insert_backup_job(&job).await?;

        job.succeed("a".into(), "b".into(), BackupSummary::default())?;
        store.finish_backup_job(&job).await?;
        assert!(store.finish_backup_job(&job).await.is_err());

        let listed = store.list_backup_jobs(10).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, JobStatus::Success);
        Ok(())
    }
}
