//! Restore runs: replay a bundle into the datastore in merge or replace mode,
//! then optionally put attachments back into primary storage.

use crate::archiver::dedupe;
use crate::auth::Actor;
use crate::bundle::{Bundle, FileManifest, ManifestEntry};
use crate::config::EngineConfig;
use crate::crypto::verify_checksum;
use crate::datastore::Datastore;
use crate::error::{FileWarning, Result, TableOperation, VaultError};
use crate::jobs::{
    FileRestoreStats, JobStatus, JobStore, RestoreJob, RestoreMode, RestoreSource, RestoreSummary,
    TableAction, TableRestoreResult,
};
use crate::logging::LogContext;
use crate::registry::ModuleRegistry;
use crate::storage::{validate_object_path, ObjectStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// What to restore and how
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub mode: RestoreMode,
    /// Module keys; empty selects the modules recorded in the bundle
    pub include_modules: Vec<String>,
    pub source: RestoreSource,
    pub restore_files: bool,
}

/// Result of a successful restore run
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub job: RestoreJob,
    pub summary: RestoreSummary,
}

/// Replays bundles into the live datastore
pub struct RestoreOrchestrator {
    registry: &'static ModuleRegistry,
    config: EngineConfig,
    datastore: Arc<dyn Datastore>,
    storage: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
}

impl RestoreOrchestrator {
    pub fn new(
        registry: &'static ModuleRegistry,
        config: EngineConfig,
        datastore: Arc<dyn Datastore>,
        storage: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            registry,
            config,
            datastore,
            storage,
            jobs,
        }
    }

    /// Run a restore for `actor`.
    ///
    /// Table failures abort the run without rolling back tables already
    /// written; the job is marked failed and [`VaultError::JobFailed`] returned.
    pub async fn run(&self, actor: &Actor, request: RestoreRequest) -> Result<RestoreOutcome> {
        let include_modules = dedupe(request.include_modules.clone());
        let mut job = RestoreJob::start(
            &actor.id,
            request.mode,
            include_modules.clone(),
            request.source.clone(),
            request.restore_files,
        );
        self.jobs.insert_restore_job(&job).await?;

        let ctx = LogContext::for_restore(job.id, request.mode, &job.include_modules);
        ctx.info("Restore started");

        let mut summary = RestoreSummary::new(request.mode, include_modules);

        let run = self
            .execute(&request, &mut summary)
            .instrument(ctx.span())
            .await;
        match run {
            Ok(()) => {
                job.succeed(summary.clone())?;
                self.jobs.finish_restore_job(&job).await?;
                info!(
                    job_id = %job.id,
                    tables = summary.tables_processed.len(),
                    "Restore finished"
                );
                Ok(RestoreOutcome { job, summary })
            }
            Err(e) => {
                ctx.error(&format!("Restore failed: {}", e));
                job.fail(e.to_string(), summary)?;
                if let Err(store_err) = self.jobs.finish_restore_job(&job).await {
                    error!(job_id = %job.id, error = %store_err, "Failed to record restore failure");
                }
                Err(VaultError::job_failed(job.id, e))
            }
        }
    }

    async fn execute(&self, request: &RestoreRequest, summary: &mut RestoreSummary) -> Result<()> {
        let bundle = self.load_bundle(&request.source).await?;

        if summary.include_modules.is_empty() {
            summary.include_modules = if bundle.meta.include_modules.is_empty() {
                self.registry.module_keys()
            } else {
                dedupe(bundle.meta.include_modules.clone())
            };
        }
        for key in self.registry.unknown_modules(&summary.include_modules) {
            summary.warnings.push(format!("unknown module '{}' ignored", key));
        }

        let wanted = self.wanted_tables(&bundle, request.restore_files, summary);

        if request.mode == RestoreMode::Replace {
            let sequence = self.registry.delete_sequence(&wanted);
            for table in sequence.ordered.iter().chain(&sequence.unordered) {
                if sequence.unordered.contains(table) {
                    warn_unordered(summary, table);
                }
                let deleted = self
                    .datastore
                    .delete_all(table, self.registry.delete_guard_column(table))
                    .await
                    .map_err(|e| VaultError::restore_table(table, TableOperation::Delete, e.to_string()))?;
                debug!(table = %table, deleted, "Cleared table");
                summary.delete_sequence.push(table.clone());
            }
        }

        let sequence = self.registry.insert_sequence(&wanted);
        for table in sequence.ordered.iter().chain(&sequence.unordered) {
            if sequence.unordered.contains(table) {
                warn_unordered(summary, table);
            }
            let rows = bundle.rows(table).unwrap_or(&[]);
            let written = self.write_table(request.mode, table, rows).await?;
            let action = match request.mode {
                RestoreMode::Merge => TableAction::Upsert,
                RestoreMode::Replace if rows.is_empty() => TableAction::Cleared,
                RestoreMode::Replace => TableAction::Insert,
            };
            info!(table = %table, rows = written, action = ?action, "Restored table");
            summary.tables_processed.push(TableRestoreResult {
                table: table.clone(),
                rows: written,
                action,
            });
        }

        if request.restore_files {
            let stats = match &bundle.files {
                Some(files) => self.restore_files(files, summary).await,
                None => {
                    summary
                        .warnings
                        .push("bundle carries no file manifest; no attachments restored".to_string());
                    FileRestoreStats::default()
                }
            };
            summary.file_restore = Some(stats);
        }

        Ok(())
    }

    /// Download and validate the bundle named by `source`
    pub async fn load_bundle(&self, source: &RestoreSource) -> Result<Bundle> {
        let path = match source {
            RestoreSource::BackupJob { backup_id } => {
                let job = self
                    .jobs
                    .get_backup_job(*backup_id)
                    .await?
                    .ok_or_else(|| VaultError::validation(format!("Backup job {} does not exist", backup_id)))?;
                if job.status != JobStatus::Success {
                    return Err(VaultError::validation(format!(
                        "Backup job {} did not succeed (status: {})",
                        backup_id, job.status
                    )));
                }
                job.json_path.ok_or_else(|| {
                    VaultError::validation(format!("Backup job {} has no structured artifact", backup_id))
                })?
            }
            RestoreSource::ArtifactPath { path } => {
                validate_object_path(path).map_err(|e| VaultError::validation(e.to_string()))?;
                path.clone()
            }
        };

        let object = self
            .storage
            .get(&self.config.backup_bucket, &path)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    VaultError::validation(format!("Bundle not found at '{}'", path))
                } else {
                    VaultError::Storage(e)
                }
            })?;

        Bundle::from_json_bytes(&object.bytes)
    }

    /// Selected module tables present in the bundle, plus attachment tables
    /// when files are restored
    fn wanted_tables(
        &self,
        bundle: &Bundle,
        restore_files: bool,
        summary: &mut RestoreSummary,
    ) -> BTreeSet<String> {
        let mut wanted = self.registry.resolve_tables(&summary.include_modules);
        if restore_files {
            wanted.extend(self.registry.attachment_tables());
        }

        for table in bundle.tables.keys() {
            if !self.registry.is_registered(table) {
                summary
                    .warnings
                    .push(format!("table '{}' is not registered; ignored", table));
            }
        }

        wanted
            .into_iter()
            .filter(|table| {
                let present = bundle.tables.contains_key(table);
                if !present {
                    summary
                        .warnings
                        .push(format!("table '{}' not present in bundle; left untouched", table));
                }
                present
            })
            .collect()
    }

    async fn write_table(&self, mode: RestoreMode, table: &str, rows: &[crate::datastore::Row]) -> Result<u64> {
        let conflict_key = self.registry.conflict_key(table);
        let mut written = 0;

        for batch in rows.chunks(self.config.write_batch_size.max(1)) {
            let result = match mode {
                RestoreMode::Merge => self.datastore.upsert_rows(table, batch, conflict_key).await,
                RestoreMode::Replace => self.datastore.insert_rows(table, batch).await,
            };
            written += result
                .map_err(|e| VaultError::restore_table(table, TableOperation::Write, e.to_string()))?;
        }

        Ok(written)
    }

    async fn restore_files(&self, files: &FileManifest, summary: &mut RestoreSummary) -> FileRestoreStats {
        let mut stats = FileRestoreStats::default();

        for entry in &files.manifest {
            match self.restore_file(entry).await {
                Ok(()) => stats.restored += 1,
                Err(reason) => {
                    stats.skipped += 1;
                    let warning = FileWarning::RestoreSkipped {
                        path: entry.original_path.clone(),
                        reason,
                    };
                    warn!("{}", warning);
                    summary.warnings.push(warning.to_string());
                }
            }
        }

        stats
    }

    async fn restore_file(&self, entry: &ManifestEntry) -> std::result::Result<(), String> {
        if !entry.copied {
            return Err("never copied into the backup".to_string());
        }

        let object = self
            .storage
            .get(&self.config.backup_bucket, &entry.backup_path)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    "backup object missing".to_string()
                } else {
                    format!("download failed: {}", e)
                }
            })?;

        if let Some(expected) = &entry.checksum {
            if !verify_checksum(&object.bytes, expected) {
                return Err("checksum mismatch".to_string());
            }
        }

        let content_type = entry.content_type.as_deref().unwrap_or(&object.content_type);
        self.storage
            .put(
                &entry.original_bucket,
                &entry.original_path,
                &object.bytes,
                content_type,
                false,
            )
            .await
            .map_err(|e| {
                if e.is_already_exists() {
                    "already exists at original location".to_string()
                } else {
                    format!("upload failed: {}", e)
                }
            })
    }
}

fn warn_unordered(summary: &mut RestoreSummary, table: &str) {
    let message = format!(
        "table '{}' has no canonical position; processed after ordered tables",
        table
    );
    if !summary.warnings.contains(&message) {
        warn!(table = %table, "Table missing from canonical order");
        summary.warnings.push(message);
    }
}
