//! Engine configuration shared by the archiver, migrator and restore orchestrator.

use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};

/// Tunables for backup and restore runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rows fetched per extraction page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Rows sent per insert/upsert statement during restore
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,

    /// Bucket holding live attachments
    #[serde(default = "default_primary_bucket")]
    pub primary_bucket: String,

    /// Bucket holding backup artifacts and copied attachments
    #[serde(default = "default_backup_bucket")]
    pub backup_bucket: String,

    /// Lifetime of issued download URLs
    #[serde(default = "default_signed_url_ttl_seconds")]
    pub signed_url_ttl_seconds: u64,

    /// Version written into bundle metadata
    #[serde(default = "default_bundle_version")]
    pub bundle_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            write_batch_size: default_write_batch_size(),
            primary_bucket: default_primary_bucket(),
            backup_bucket: default_backup_bucket(),
            signed_url_ttl_seconds: default_signed_url_ttl_seconds(),
            bundle_version: default_bundle_version(),
        }
    }
}

fn default_page_size() -> usize {
    1000
}

fn default_write_batch_size() -> usize {
    500
}

fn default_primary_bucket() -> String {
    "crm-files".to_string()
}

fn default_backup_bucket() -> String {
    "crm-backups".to_string()
}

fn default_signed_url_ttl_seconds() -> u64 {
    3600
}

fn default_bundle_version() -> String {
    "1".to_string()
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(VaultError::config("page_size must be greater than 0"));
        }
        if self.write_batch_size == 0 {
            return Err(VaultError::config("write_batch_size must be greater than 0"));
        }
        if self.primary_bucket.is_empty() || self.backup_bucket.is_empty() {
            return Err(VaultError::config("bucket names cannot be empty"));
        }
        if self.primary_bucket == self.backup_bucket {
            return Err(VaultError::config(
                "primary_bucket and backup_bucket must differ",
            ));
        }
        if self.signed_url_ttl_seconds == 0 {
            return Err(VaultError::config(
                "signed_url_ttl_seconds must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Signed URL lifetime as a chrono duration
    pub fn signed_url_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.signed_url_ttl_seconds.min(i64::MAX as u64) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.write_batch_size, 500);
        assert_eq!(config.primary_bucket, "crm-files");
        assert_eq!(config.backup_bucket, "crm-backups");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"page_size": 50}"#).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.bundle_version, "1");
    }

    #[test]
    fn test_invalid_config() {
        let config = EngineConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            backup_bucket: "crm-files".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
