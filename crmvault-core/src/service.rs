//! The operations exposed to callers. Every operation verifies the caller
//! through the [`AuthGuard`] before touching the datastore or storage.

use crate::api::{
    BackupArtifacts, BackupJobResponse, BackupListItem, CreateBackupRequest, CreateBackupResponse,
    ListBackupsResponse, ListRestoresResponse, ModuleInfo, ModulesResponse, RestoreJobResponse,
    RestoreRequestBody, RestoreResponse,
};
use crate::archiver::{BackupArchiver, BackupRequest};
use crate::auth::{AuthGuard, Authorizer};
use crate::config::EngineConfig;
use crate::datastore::Datastore;
use crate::error::{Result, VaultError};
use crate::jobs::{BackupJob, JobStore, RestoreMode, RestoreSource};
use crate::registry::ModuleRegistry;
use crate::restore::{RestoreOrchestrator, RestoreRequest};
use crate::storage::ObjectStore;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Jobs returned when no limit is given
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Largest accepted list limit
pub const MAX_LIST_LIMIT: usize = 100;

/// Backends a service runs against
#[derive(Clone)]
pub struct Backends {
    pub datastore: Arc<dyn Datastore>,
    pub storage: Arc<dyn ObjectStore>,
    pub jobs: Arc<dyn JobStore>,
    pub authorizer: Arc<dyn Authorizer>,
}

/// Facade over the archiver, the restore orchestrator and the job tracker
pub struct BackupService {
    registry: &'static ModuleRegistry,
    config: EngineConfig,
    guard: AuthGuard,
    storage: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    archiver: BackupArchiver,
    orchestrator: RestoreOrchestrator,
}

impl BackupService {
    pub fn new(
        registry: &'static ModuleRegistry,
        config: EngineConfig,
        backends: Backends,
    ) -> Result<Self> {
        config.validate()?;
        if let Err(problems) = registry.validate() {
            return Err(VaultError::config(format!(
                "Module registry is inconsistent: {}",
                problems.join("; ")
            )));
        }

        let archiver = BackupArchiver::new(
            registry,
            config.clone(),
            backends.datastore.clone(),
            backends.storage.clone(),
            backends.jobs.clone(),
        );
        let orchestrator = RestoreOrchestrator::new(
            registry,
            config.clone(),
            backends.datastore,
            backends.storage.clone(),
            backends.jobs.clone(),
        );

        Ok(Self {
            registry,
            config,
            guard: AuthGuard::new(backends.authorizer),
            storage: backends.storage,
            jobs: backends.jobs,
            archiver,
            orchestrator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    /// Run a backup
    pub async fn create_backup(
        &self,
        credential: Option<&str>,
        request: CreateBackupRequest,
    ) -> Result<CreateBackupResponse> {
        let actor = self.guard.verify(credential, "backup").await?;

        let outcome = self
            .archiver
            .run(&actor, BackupRequest {
                include_modules: request.include_modules.unwrap_or_default(),
                include_files: request.include_files.unwrap_or(false),
            })
            .await?;

        Ok(CreateBackupResponse {
            success: true,
            backup_id: outcome.job.id,
            artifacts: BackupArtifacts {
                structured: outcome.structured,
                tabular: outcome.tabular,
            },
            result_summary: outcome.summary,
        })
    }

    /// Most recent backups, newest first
    pub async fn list_backups(
        &self,
        credential: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ListBackupsResponse> {
        self.guard.verify(credential, "list backups").await?;

        let jobs = self.jobs.list_backup_jobs(clamp_limit(limit)).await?;
        Ok(ListBackupsResponse {
            success: true,
            backups: jobs.into_iter().map(|job| self.list_item(job)).collect(),
        })
    }

    /// One backup job
    pub async fn get_backup(&self, credential: Option<&str>, id: Uuid) -> Result<BackupJobResponse> {
        self.guard.verify(credential, "get backup").await?;

        let job = self
            .jobs
            .get_backup_job(id)
            .await?
            .ok_or_else(|| VaultError::not_found("Backup job", id.to_string()))?;
        Ok(BackupJobResponse {
            success: true,
            backup: self.list_item(job),
        })
    }

    /// Run a restore
    pub async fn restore(
        &self,
        credential: Option<&str>,
        request: RestoreRequestBody,
    ) -> Result<RestoreResponse> {
        let actor = self.guard.verify(credential, "restore").await?;

        let mode: RestoreMode = request.mode.trim().parse()?;
        let source = restore_source(
            request.source_backup_id.as_deref(),
            request.source_file_path.as_deref(),
        )?;

        let outcome = self
            .orchestrator
            .run(&actor, RestoreRequest {
                mode,
                include_modules: request.include_modules.unwrap_or_default(),
                source,
                restore_files: request.restore_files.unwrap_or(false),
            })
            .await?;

        Ok(RestoreResponse {
            success: true,
            restore_id: outcome.job.id,
            summary: outcome.summary,
        })
    }

    /// Most recent restores, newest first
    pub async fn list_restores(
        &self,
        credential: Option<&str>,
        limit: Option<usize>,
    ) -> Result<ListRestoresResponse> {
        self.guard.verify(credential, "list restores").await?;

        Ok(ListRestoresResponse {
            success: true,
            restores: self.jobs.list_restore_jobs(clamp_limit(limit)).await?,
        })
    }

    /// One restore job
    pub async fn get_restore(&self, credential: Option<&str>, id: Uuid) -> Result<RestoreJobResponse> {
        self.guard.verify(credential, "get restore").await?;

        let restore = self
            .jobs
            .get_restore_job(id)
            .await?
            .ok_or_else(|| VaultError::not_found("Restore job", id.to_string()))?;
        Ok(RestoreJobResponse {
            success: true,
            restore,
        })
    }

    /// Registered modules and their tables
    pub async fn modules(&self, credential: Option<&str>) -> Result<ModulesResponse> {
        self.guard.verify(credential, "list modules").await?;

        Ok(ModulesResponse {
            success: true,
            modules: self.registry.modules.iter().map(ModuleInfo::from).collect(),
        })
    }

    fn list_item(&self, job: BackupJob) -> BackupListItem {
        let structured_url = self.sign(job.json_path.as_deref());
        let tabular_url = self.sign(job.workbook_path.as_deref());
        BackupListItem {
            id: job.id,
            created_at: job.created_at,
            created_by: job.created_by,
            status: job.status,
            include_modules: job.include_modules,
            formats: job.formats,
            result_summary: job.result_summary,
            error_message: job.error_message,
            finished_at: job.finished_at,
            structured_url,
            tabular_url,
        }
    }

    fn sign(&self, path: Option<&str>) -> Option<String> {
        let path = path?;
        match self
            .storage
            .signed_url(&self.config.backup_bucket, path, self.config.signed_url_ttl())
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to sign artifact URL");
                None
            }
        }
    }
}

/// Clamp a requested list size into `1..=MAX_LIST_LIMIT`
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn restore_source(backup_id: Option<&str>, file_path: Option<&str>) -> Result<RestoreSource> {
    let backup_id = backup_id.map(str::trim).filter(|s| !s.is_empty());
    let file_path = file_path.map(str::trim).filter(|s| !s.is_empty());

    match (backup_id, file_path) {
        (Some(id), None) => {
            let backup_id = Uuid::parse_str(id)
                .map_err(|_| VaultError::validation(format!("Invalid backup id: {}", id)))?;
            Ok(RestoreSource::BackupJob { backup_id })
        }
        (None, Some(path)) => Ok(RestoreSource::ArtifactPath {
            path: path.to_string(),
        }),
        (Some(_), Some(_)) => Err(VaultError::validation(
            "Provide either sourceBackupId or sourceFilePath, not both",
        )),
        (None, None) => Err(VaultError::validation(
            "A restore needs sourceBackupId or sourceFilePath",
        )),
    }
}
