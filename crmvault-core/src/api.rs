//! Request and response bodies of the external interface. All keys are camelCase.

use crate::archiver::ArtifactRef;
use crate::jobs::{ArtifactFormat, BackupSummary, JobStatus, RestoreJob, RestoreSummary};
use crate::registry::ModuleDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of a create-backup call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub include_modules: Option<Vec<String>>,
    #[serde(default)]
    pub include_files: Option<bool>,
}

/// Both artifacts of a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifacts {
    pub structured: ArtifactRef,
    pub tabular: ArtifactRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupResponse {
    pub success: bool,
    pub backup_id: Uuid,
    pub artifacts: BackupArtifacts,
    pub result_summary: BackupSummary,
}

/// A backup job as listed, with download URLs issued at read time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupListItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub status: JobStatus,
    pub include_modules: Vec<String>,
    pub formats: Vec<ArtifactFormat>,
    pub result_summary: Option<BackupSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub structured_url: Option<String>,
    pub tabular_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListBackupsResponse {
    pub success: bool,
    pub backups: Vec<BackupListItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupJobResponse {
    pub success: bool,
    pub backup: BackupListItem,
}

/// Body of a restore call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequestBody {
    /// `merge` or `replace`
    pub mode: String,
    #[serde(default)]
    pub include_modules: Option<Vec<String>>,
    #[serde(default)]
    pub source_backup_id: Option<String>,
    #[serde(default)]
    pub source_file_path: Option<String>,
    #[serde(default)]
    pub restore_files: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub success: bool,
    pub restore_id: Uuid,
    pub summary: RestoreSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRestoresResponse {
    pub success: bool,
    pub restores: Vec<RestoreJob>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreJobResponse {
    pub success: bool,
    pub restore: RestoreJob,
}

/// A module as exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub key: String,
    pub label: String,
    pub tables: Vec<String>,
}

impl From<&ModuleDefinition> for ModuleInfo {
    fn from(module: &ModuleDefinition) -> Self {
        Self {
            key: module.key.to_string(),
            label: module.label.to_string(),
            tables: module.tables.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulesResponse {
    pub success: bool,
    pub modules: Vec<ModuleInfo>,
}

/// Error body returned for every failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, job_id: Option<Uuid>) -> Self {
        Self {
            success: false,
            error: error.into(),
            job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_restore_request_accepts_minimal_body() {
        let body: RestoreRequestBody = serde_json::from_value(json!({
            "mode": "merge",
            "sourceFilePath": "backups/x/backup.json"
        }))
        .unwrap();
        assert_eq!(body.mode, "merge");
        assert_eq!(body.source_file_path.as_deref(), Some("backups/x/backup.json"));
        assert!(body.include_modules.is_none());
        assert!(body.restore_files.is_none());
    }

    #[test]
    fn test_error_response_omits_missing_job_id() {
        let value = serde_json::to_value(ErrorResponse::new("Authentication required", None)).unwrap();
        assert_eq!(value, json!({"success": false, "error": "Authentication required"}));
    }
}
