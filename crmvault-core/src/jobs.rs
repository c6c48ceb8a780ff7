//! Backup and restore job records and their persistence seam.

use crate::error::{Result, VaultError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(VaultError::validation(format!("Invalid job status: {}", s))),
        }
    }
}

/// Artifact formats produced by a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// JSON bundle
    Json,
    /// Excel workbook
    Xlsx,
}

/// Restore strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Upsert by conflict key, keeping unrelated rows
    Merge,
    /// Clear wanted tables, then insert
    Replace,
}

impl std::fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestoreMode::Merge => write!(f, "merge"),
            RestoreMode::Replace => write!(f, "replace"),
        }
    }
}

impl std::str::FromStr for RestoreMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(RestoreMode::Merge),
            "replace" => Ok(RestoreMode::Replace),
            _ => Err(VaultError::validation(format!(
                "Unknown restore mode '{}': expected 'merge' or 'replace'",
                s
            ))),
        }
    }
}

/// Where a restore reads its bundle from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RestoreSource {
    /// The structured artifact of an earlier backup job
    #[serde(rename_all = "camelCase")]
    BackupJob { backup_id: Uuid },
    /// A bundle path in the backup bucket
    #[serde(rename_all = "camelCase")]
    ArtifactPath { path: String },
}

/// Attachment copy statistics of a backup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBackupStats {
    pub attempted: u64,
    pub copied: u64,
    pub failed: u64,
}

/// Result summary of a backup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    /// Row count per extracted table
    pub counts: BTreeMap<String, u64>,
    pub include_modules: Vec<String>,
    pub include_files: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FileBackupStats>,
}

/// What a restore did to one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAction {
    /// Rows upserted by conflict key
    Upsert,
    /// Table cleared, rows inserted
    Insert,
    /// Table cleared, bundle had no rows for it
    Cleared,
}

/// Per-table restore result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRestoreResult {
    pub table: String,
    pub rows: u64,
    pub action: TableAction,
}

/// Attachment restore counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRestoreStats {
    pub restored: u64,
    pub skipped: u64,
}

/// Result summary of a restore run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub mode: RestoreMode,
    pub include_modules: Vec<String>,
    /// Tables cleared, in the order they were cleared
    #[serde(default)]
    pub delete_sequence: Vec<String>,
    pub tables_processed: Vec<TableRestoreResult>,
    pub file_restore: Option<FileRestoreStats>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RestoreSummary {
    /// Empty summary for a run in `mode`
    pub fn new(mode: RestoreMode, include_modules: Vec<String>) -> Self {
        Self {
            mode,
            include_modules,
            delete_sequence: Vec::new(),
            tables_processed: Vec::new(),
            file_restore: None,
            warnings: Vec::new(),
        }
    }
}

/// Persisted backup run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupJob {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub status: JobStatus,
    pub include_modules: Vec<String>,
    pub formats: Vec<ArtifactFormat>,
    pub json_path: Option<String>,
    pub workbook_path: Option<String>,
    pub result_summary: Option<BackupSummary>,
    pub error_message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BackupJob {
    /// Start a new running job
    pub fn start(created_by: impl Into<String>, include_modules: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            created_by: created_by.into(),
            status: JobStatus::Running,
            include_modules,
            formats: vec![ArtifactFormat::Json, ArtifactFormat::Xlsx],
            json_path: None,
            workbook_path: None,
            result_summary: None,
            error_message: None,
            finished_at: None,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(VaultError::persistence(format!(
                "Backup job {} already finished with status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Mark the job successful
    pub fn succeed(
        &mut self,
        json_path: String,
        workbook_path: String,
        summary: BackupSummary,
    ) -> Result<()> {
        self.ensure_running()?;
        self.status = JobStatus::Success;
        self.json_path = Some(json_path);
        self.workbook_path = Some(workbook_path);
        self.result_summary = Some(summary);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job failed, keeping whatever was accumulated
    pub fn fail(&mut self, message: impl Into<String>, partial: BackupSummary) -> Result<()> {
        self.ensure_running()?;
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.result_summary = Some(partial);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// Persisted restore run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreJob {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub mode: RestoreMode,
    pub include_modules: Vec<String>,
    pub source: RestoreSource,
    pub restore_files: bool,
    pub status: JobStatus,
    pub result_summary: Option<RestoreSummary>,
    pub error_message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RestoreJob {
    /// Start a new running job
    pub fn start(
        created_by: impl Into<String>,
        mode: RestoreMode,
        include_modules: Vec<String>,
        source: RestoreSource,
        restore_files: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            created_by: created_by.into(),
            mode,
            include_modules,
            source,
            restore_files,
            status: JobStatus::Running,
            result_summary: None,
            error_message: None,
            finished_at: None,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(VaultError::persistence(format!(
                "Restore job {} already finished with status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Mark the job successful
    pub fn succeed(&mut self, summary: RestoreSummary) -> Result<()> {
        self.ensure_running()?;
        self.status = JobStatus::Success;
        self.result_summary = Some(summary);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job failed, keeping whatever was accumulated
    pub fn fail(&mut self, message: impl Into<String>, partial: RestoreSummary) -> Result<()> {
        self.ensure_running()?;
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.result_summary = Some(partial);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

/// Persistence for job records.
///
/// `finish_*` only succeeds for a job that is still running in the store.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_backup_job(&self, job: &BackupJob) -> Result<()>;

    async fn finish_backup_job(&self, job: &BackupJob) -> Result<()>;

    async fn get_backup_job(&self, id: Uuid) -> Result<Option<BackupJob>>;

    /// Most recent first
    async fn list_backup_jobs(&self, limit: usize) -> Result<Vec<BackupJob>>;

    async fn insert_restore_job(&self, job: &RestoreJob) -> Result<()>;

    async fn finish_restore_job(&self, job: &RestoreJob) -> Result<()>;

    async fn get_restore_job(&self, id: Uuid) -> Result<Option<RestoreJob>>;

    /// Most recent first
    async fn list_restore_jobs(&self, limit: usize) -> Result<Vec<RestoreJob>>;
}
