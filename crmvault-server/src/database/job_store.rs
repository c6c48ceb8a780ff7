//! Backup and restore job records in PostgreSQL

use crate::database::error::{query_error, DatabaseError};
use async_trait::async_trait;
use crmvault_core::{
    BackupJob, BackupSummary, JobStore, RestoreJob, RestoreMode, RestoreSource,
    RestoreSummary, Result, VaultError,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Job store backed by the `backup_jobs` and `restore_jobs` tables
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| {
        DatabaseError::Deserialization {
            message: format!("column '{}': {}", name, e),
        }
        .into()
    })
}

fn backup_from_row(row: &PgRow) -> Result<BackupJob> {
    let status: String = column(row, "status")?;
    let include_modules: Json<Vec<String>> = column(row, "include_modules")?;
    let formats: Json<Vec<crmvault_core::jobs::ArtifactFormat>> = column(row, "formats")?;
    let result_summary: Option<Json<BackupSummary>> = column(row, "result_summary")?;

    Ok(BackupJob {
        id: column(row, "id")?,
        created_at: column(row, "created_at")?,
        created_by: column(row, "created_by")?,
        status: status.parse()?,
        include_modules: include_modules.0,
        formats: formats.0,
        json_path: column(row, "json_path")?,
        workbook_path: column(row, "workbook_path")?,
        result_summary: result_summary.map(|Json(s)| s),
        error_message: column(row, "error_message")?,
        finished_at: column(row, "finished_at")?,
    })
}

fn restore_from_row(row: &PgRow) -> Result<RestoreJob> {
    let status: String = column(row, "status")?;
    let mode: String = column(row, "mode")?;
    let include_modules: Json<Vec<String>> = column(row, "include_modules")?;
    let source: Json<RestoreSource> = column(row, "source")?;
    let result_summary: Option<Json<RestoreSummary>> = column(row, "result_summary")?;

    Ok(RestoreJob {
        id: column(row, "id")?,
        created_at: column(row, "created_at")?,
        created_by: column(row, "created_by")?,
        mode: mode.parse::<RestoreMode>()?,
        include_modules: include_modules.0,
        source: source.0,
        restore_files: column(row, "restore_files")?,
        status: status.parse()?,
        result_summary: result_summary.map(|Json(s)| s),
        error_message: column(row, "error_message")?,
        finished_at: column(row, "finished_at")?,
    })
}

fn not_running(kind: &str, id: Uuid) -> VaultError {
    VaultError::persistence(format!("{} job {} is not running", kind, id))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert_backup_job(&self, job: &BackupJob) -> Result<()> {
        let query = r#"
            INSERT INTO backup_jobs (id, created_at, created_by, status, include_modules, formats)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        sqlx::query(query)
            .bind(job.id)
            .bind(job.created_at)
            .bind(&job.created_by)
            .bind(job.status.to_string())
            .bind(Json(&job.include_modules))
            .bind(Json(&job.formats))
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        tracing::info!("Created backup job: {}", job.id);
        Ok(())
    }

    async fn finish_backup_job(&self, job: &BackupJob) -> Result<()> {
        let query = r#"
            UPDATE backup_jobs
            SET status = $2, json_path = $3, workbook_path = $4, result_summary = $5,
                error_message = $6, finished_at = $7
            WHERE id = $1 AND status = 'running'
        "#;

        let result = sqlx::query(query)
            .bind(job.id)
            .bind(job.status.to_string())
            .bind(&job.json_path)
            .bind(&job.workbook_path)
            .bind(job.result_summary.as_ref().map(Json))
            .bind(&job.error_message)
            .bind(job.finished_at)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(not_running("Backup", job.id));
        }
        tracing::info!("Finished backup job {} with status {}", job.id, job.status);
        Ok(())
    }

    async fn get_backup_job(&self, id: Uuid) -> Result<Option<BackupJob>> {
        let row = sqlx::query("SELECT * FROM backup_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(backup_from_row).transpose()
    }

    async fn list_backup_jobs(&self, limit: usize) -> Result<Vec<BackupJob>> {
        let rows = sqlx::query("SELECT * FROM backup_jobs ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(backup_from_row).collect()
    }

    async fn insert_restore_job(&self, job: &RestoreJob) -> Result<()> {
        let query = r#"
            INSERT INTO restore_jobs (id, created_at, created_by, mode, include_modules, source, restore_files, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#;

        sqlx::query(query)
            .bind(job.id)
            .bind(job.created_at)
            .bind(&job.created_by)
            .bind(job.mode.to_string())
            .bind(Json(&job.include_modules))
            .bind(Json(&job.source))
            .bind(job.restore_files)
            .bind(job.status.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        tracing::info!("Created restore job: {}", job.id);
        Ok(())
    }

    async fn finish_restore_job(&self, job: &RestoreJob) -> Result<()> {
        let query = r#"
            UPDATE restore_jobs
            SET status = $2, result_summary = $3, error_message = $4, finished_at = $5
            WHERE id = $1 AND status = 'running'
        "#;

        let result = sqlx::query(query)
            .bind(job.id)
            .bind(job.status.to_string())
            .bind(job.result_summary.as_ref().map(Json))
            .bind(&job.error_message)
            .bind(job.finished_at)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(not_running("Restore", job.id));
        }
        tracing::info!("Finished restore job {} with status {}", job.id, job.status);
        Ok(())
    }

    async fn get_restore_job(&self, id: Uuid) -> Result<Option<RestoreJob>> {
        let row = sqlx::query("SELECT * FROM restore_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(restore_from_row).transpose()
    }

    async fn list_restore_jobs(&self, limit: usize) -> Result<Vec<RestoreJob>> {
        let rows = sqlx::query("SELECT * FROM restore_jobs ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(restore_from_row).collect()
    }
}
