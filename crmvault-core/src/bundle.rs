//! The portable snapshot written by a backup and replayed by a restore.

use crate::datastore::Row;
use crate::error::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Bundle metadata block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMeta {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub include_modules: Vec<String>,
    #[serde(default)]
    pub include_files: bool,
}

/// One attachment relocation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub original_bucket: String,
    pub original_path: String,
    pub backup_path: String,
    /// Whether the bytes were copied to `backup_path`
    #[serde(default = "default_copied")]
    pub copied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_copied() -> bool {
    true
}

/// Attachment manifest carried by a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub manifest: Vec<ManifestEntry>,
}

impl FileManifest {
    /// Entries whose bytes were copied
    pub fn copied(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.manifest.iter().filter(|e| e.copied)
    }

    /// Entries whose copy failed
    pub fn failed(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.manifest.iter().filter(|e| !e.copied)
    }
}

/// Structured backup bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub meta: BundleMeta,
    /// Table name to rows in extraction order
    pub tables: BTreeMap<String, Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FileManifest>,
}

impl Bundle {
    /// Create an empty bundle
    pub fn new(meta: BundleMeta) -> Self {
        Self {
            meta,
            tables: BTreeMap::new(),
            files: None,
        }
    }

    /// Add a table's rows
    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(table.into(), rows);
        self
    }

    /// Row counts per table
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.tables
            .iter()
            .map(|(table, rows)| (table.clone(), rows.len() as u64))
            .collect()
    }

    /// Rows of a table, if present
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Serialize to the structured artifact
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| VaultError::archive(format!("Failed to serialize bundle: {}", e)))
    }

    /// Parse and validate a structured artifact
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::validation(format!("Bundle is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate the bundle shape before deserializing it.
    ///
    /// `meta.version` must be a non-empty string and `tables` must map table
    /// names to arrays of objects.
    pub fn from_value(value: Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| VaultError::validation("Bundle must be a JSON object"))?;

        let meta = root
            .get("meta")
            .and_then(Value::as_object)
            .ok_or_else(|| VaultError::validation("Bundle is missing 'meta'"))?;
        match meta.get("version") {
            Some(Value::String(v)) if !v.trim().is_empty() => {}
            Some(Value::Number(_)) => {}
            _ => return Err(VaultError::validation("Bundle is missing 'meta.version'")),
        }

        let tables = root
            .get("tables")
            .and_then(Value::as_object)
            .ok_or_else(|| VaultError::validation("Bundle is missing a 'tables' map"))?;
        for (table, rows) in tables {
            let rows = rows.as_array().ok_or_else(|| {
                VaultError::validation(format!("Table '{}' must be an array of rows", table))
            })?;
            if rows.iter().any(|row| !row.is_object()) {
                return Err(VaultError::validation(format!(
                    "Table '{}' contains a row that is not an object",
                    table
                )));
            }
        }

        let mut value = value;
        // older bundles wrote numeric versions
        if let Some(Value::Number(n)) = value.pointer("/meta/version").cloned() {
            if let Some(version) = value.pointer_mut("/meta/version") {
                *version = Value::String(n.to_string());
            }
        }

        serde_json::from_value(value)
            .map_err(|e| VaultError::validation(format!("Malformed bundle: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> BundleMeta {
        BundleMeta {
            version: "1".to_string(),
            created_at: Utc::now(),
            created_by: "admin@example.com".to_string(),
            include_modules: vec!["leads".to_string()],
            include_files: false,
        }
    }

    #[test]
    fn test_bundle_json_shape() -> Result<()> {
        let row = json!({"id": "l-1", "name": "Acme"}).as_object().cloned().unwrap();
        let bundle = Bundle::new(meta()).with_table("leads", vec![row]);

        let value: Value = serde_json::from_slice(&bundle.to_json_bytes()?)?;
        assert_eq!(value["meta"]["version"], "1");
        assert_eq!(value["meta"]["createdBy"], "admin@example.com");
        assert_eq!(value["meta"]["includeModules"], json!(["leads"]));
        assert_eq!(value["meta"]["includeFiles"], false);
        assert_eq!(value["tables"]["leads"][0]["name"], "Acme");
        assert!(value.get("files").is_none());

        let parsed = Bundle::from_json_bytes(&bundle.to_json_bytes()?)?;
        assert_eq!(parsed, bundle);
        Ok(())
    }

    #[test]
    fn test_manifest_defaults_to_copied() -> Result<()> {
        let bundle = Bundle::from_value(json!({
            "meta": {"version": "1", "createdAt": "2024-05-01T10:00:00Z", "createdBy": "a"},
            "tables": {},
            "files": {"manifest": [
                {"originalBucket": "crm-files", "originalPath": "a.pdf", "backupPath": "backups/x/files/a.pdf"}
            ]}
        }))?;
        let files = bundle.files.unwrap();
        assert_eq!(files.copied().count(), 1);
        assert_eq!(files.failed().count(), 0);
        Ok(())
    }

    #[test]
    fn test_missing_version_is_rejected() {
        let err = Bundle::from_value(json!({
            "meta": {"createdAt": "2024-05-01T10:00:00Z", "createdBy": "a"},
            "tables": {}
        }))
        .unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
        assert!(err.to_string().contains("meta.version"));
    }

    #[test]
    fn test_missing_tables_is_rejected() {
        let err = Bundle::from_value(json!({
            "meta": {"version": "1", "createdAt": "2024-05-01T10:00:00Z", "createdBy": "a"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("tables"));

        let err = Bundle::from_value(json!({
            "meta": {"version": "1", "createdAt": "2024-05-01T10:00:00Z", "createdBy": "a"},
            "tables": {"leads": {"id": 1}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("array"));

        let err = Bundle::from_value(json!({
            "meta": {"version": "1", "createdAt": "2024-05-01T10:00:00Z", "createdBy": "a"},
            "tables": {"leads": [1, 2]}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn test_numeric_version_is_accepted() -> Result<()> {
        let bundle = Bundle::from_value(json!({
            "meta": {"version": 1, "createdAt": "2024-05-01T10:00:00Z", "createdBy": "a"},
            "tables": {"leads": []}
        }))?;
        assert_eq!(bundle.meta.version, "1");
        assert_eq!(bundle.counts().get("leads"), Some(&0));
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = Bundle::from_json_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
    }
}
