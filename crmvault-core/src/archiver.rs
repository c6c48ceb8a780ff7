//! Backup runs: extract the selected tables, build both artifacts, upload
//! them and record the job.

use crate::attachments::AttachmentMigrator;
use crate::auth::Actor;
use crate::bundle::{Bundle, BundleMeta};
use crate::config::EngineConfig;
use crate::datastore::Datastore;
use crate::error::{Result, VaultError};
use crate::extractor::TableExtractor;
use crate::jobs::{BackupJob, BackupSummary, JobStore};
use crate::logging::LogContext;
use crate::registry::ModuleRegistry;
use crate::storage::ObjectStore;
use crate::workbook::render_workbook;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, Instrument};
use uuid::Uuid;

const JSON_CONTENT_TYPE: &str = "application/json";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Object key of a job's structured artifact
pub fn structured_artifact_path(job_id: Uuid) -> String {
    format!("backups/{}/backup.json", job_id)
}

/// Object key of a job's tabular artifact
pub fn tabular_artifact_path(job_id: Uuid) -> String {
    format!("backups/{}/backup.xlsx", job_id)
}

/// What to back up
#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    /// Module keys; empty selects every module
    pub include_modules: Vec<String>,
    pub include_files: bool,
}

/// An uploaded artifact and a short-lived download URL for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub url: String,
}

/// Result of a successful backup run
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub job: BackupJob,
    pub structured: ArtifactRef,
    pub tabular: ArtifactRef,
    pub summary: BackupSummary,
}

/// Runs backups end to end
pub struct BackupArchiver {
    registry: &'static ModuleRegistry,
    config: EngineConfig,
    datastore: Arc<dyn Datastore>,
    storage: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    extractor: TableExtractor,
    migrator: AttachmentMigrator,
}

impl BackupArchiver {
    pub fn new(
        registry: &'static ModuleRegistry,
        config: EngineConfig,
        datastore: Arc<dyn Datastore>,
        storage: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        let migrator = AttachmentMigrator::new(
            registry,
            storage.clone(),
            config.primary_bucket.clone(),
            config.backup_bucket.clone(),
        );
        Self {
            registry,
            extractor: TableExtractor::new(config.page_size),
            config,
            datastore,
            storage,
            jobs,
            migrator,
        }
    }

    /// Run a backup for `actor`.
    ///
    /// Once the job record exists, any failure marks it failed with the
    /// partial summary and is returned as [`VaultError::JobFailed`].
    pub async fn run(&self, actor: &Actor, request: BackupRequest) -> Result<BackupOutcome> {
        let requested = if request.include_modules.is_empty() {
            self.registry.module_keys()
        } else {
            dedupe(request.include_modules)
        };
        let unknown = self.registry.unknown_modules(&requested);
        let modules: Vec<String> = requested
            .into_iter()
            .filter(|key| !unknown.contains(key))
            .collect();

        let mut job = BackupJob::start(&actor.id, modules.clone());
        self.jobs.insert_backup_job(&job).await?;

        let ctx = LogContext::for_backup(job.id, &modules);
        ctx.info("Backup started");

        let mut summary = BackupSummary {
            include_modules: modules.clone(),
            include_files: request.include_files,
            warnings: unknown
                .iter()
                .map(|key| format!("unknown module '{}' ignored", key))
                .collect(),
            ..Default::default()
        };

        let run = self
            .execute(&job, &actor.id, &modules, request.include_files, &mut summary)
            .instrument(ctx.span())
            .await;
        match run {
            Ok((structured, tabular)) => {
                job.succeed(structured.path.clone(), tabular.path.clone(), summary.clone())?;
                self.jobs.finish_backup_job(&job).await?;
                info!(
                    job_id = %job.id,
                    tables = summary.counts.len(),
                    rows = summary.counts.values().sum::<u64>(),
                    "Backup finished"
                );
                Ok(BackupOutcome {
                    job,
                    structured,
                    tabular,
                    summary,
                })
            }
            Err(e) => {
                ctx.error(&format!("Backup failed: {}", e));
                job.fail(e.to_string(), summary)?;
                if let Err(store_err) = self.jobs.finish_backup_job(&job).await {
                    error!(job_id = %job.id, error = %store_err, "Failed to record backup failure");
                }
                Err(VaultError::job_failed(job.id, e))
            }
        }
    }

    async fn execute(
        &self,
        job: &BackupJob,
        created_by: &str,
        modules: &[String],
        include_files: bool,
        summary: &mut BackupSummary,
    ) -> Result<(ArtifactRef, ArtifactRef)> {
        let mut bundle = Bundle::new(BundleMeta {
            version: self.config.bundle_version.clone(),
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            include_modules: modules.to_vec(),
            include_files,
        });

        for table in self.registry.resolve_tables(modules) {
            let rows = self
                .extractor
                .extract_all(self.datastore.as_ref(), &table, self.registry.conflict_key(&table))
                .await?;
            info!(job_id = %job.id, table = %table, rows = rows.len(), "Extracted table");
            summary.counts.insert(table.clone(), rows.len() as u64);
            bundle.tables.insert(table, rows);
        }

        if include_files {
            let outcome = self.migrator.migrate(job.id, &bundle.tables).await;
            summary
                .warnings
                .extend(outcome.warnings.iter().map(ToString::to_string));
            summary.files = Some(outcome.stats);
            bundle.files = Some(outcome.manifest);
        }

        let json = bundle.to_json_bytes()?;
        let workbook = render_workbook(&bundle)?;

        let structured = self
            .upload(structured_artifact_path(job.id), &json, JSON_CONTENT_TYPE)
            .await?;
        let tabular = self
            .upload(tabular_artifact_path(job.id), &workbook, XLSX_CONTENT_TYPE)
            .await?;

        Ok((structured, tabular))
    }

    async fn upload(&self, path: String, bytes: &[u8], content_type: &str) -> Result<ArtifactRef> {
        let bucket = &self.config.backup_bucket;
        self.storage
            .put(bucket, &path, bytes, content_type, true)
            .await
            .map_err(|e| VaultError::archive(format!("Failed to upload {}: {}", path, e)))?;
        let url = self
            .storage
            .signed_url(bucket, &path, self.config.signed_url_ttl())
            .map_err(|e| VaultError::archive(format!("Failed to sign {}: {}", path, e)))?;
        Ok(ArtifactRef { path, url })
    }
}

/// Drop repeated keys, keeping first occurrences in order
pub(crate) fn dedupe(keys: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}
