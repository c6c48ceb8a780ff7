//! Object storage abstraction for backup artifacts and attachments.
//!
//! This module provides a trait for bucket/path addressed storage and a file
//! system implementation.

use crate::crypto::UrlSigner;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Bytes of a stored object with its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl StoredObject {
    /// Create a new stored object
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

/// Trait for object storage operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<StoredObject>;

    /// Upload an object; fails with `AlreadyExists` when `overwrite` is false and the object exists.
    ///
    /// `content_type` is returned unchanged by later `get` calls.
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, bucket: &str, path: &str) -> StorageResult<bool>;

    /// Issue a download URL valid for `ttl`
    fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> StorageResult<String>;
}

/// Content type guessed from an object path
pub fn guess_content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Reject paths that are empty, absolute or climb out of their bucket
pub fn validate_object_path(path: &str) -> StorageResult<()> {
    let invalid = || StorageError::InvalidPath {
        path: path.to_string(),
    };

    if path.is_empty() || path.contains('\0') || path.starts_with('/') || path.contains('\\') {
        return Err(invalid());
    }
    for component in Path::new(path).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(invalid());
        }
    }
    Ok(())
}

fn validate_bucket(bucket: &str) -> StorageResult<()> {
    if bucket.is_empty() || bucket.contains('/') || bucket.contains('\\') || bucket.starts_with('.') {
        return Err(StorageError::InvalidPath {
            path: bucket.to_string(),
        });
    }
    Ok(())
}

/// Directory under the root holding content-type sidecars; bucket names may not start with `.`
const METADATA_DIR: &str = ".content-types";

/// File system object store: `<root>/<bucket>/<path>`.
///
/// The uploaded content type is kept in `<root>/.content-types/<bucket>/<path>`.
/// Objects written without a sidecar fall back to a guess from the path.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store
    pub fn new<P: AsRef<Path>>(base_path: P, signer: UrlSigner) -> StorageResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path, signer })
    }

    /// Get the full path for an object
    fn object_path(&self, bucket: &str, path: &str) -> StorageResult<PathBuf> {
        validate_bucket(bucket)?;
        validate_object_path(path)?;
        Ok(self.base_path.join(bucket).join(path))
    }

    fn content_type_path(&self, bucket: &str, path: &str) -> PathBuf {
        self.base_path.join(METADATA_DIR).join(bucket).join(path)
    }

    async fn read_content_type(&self, bucket: &str, path: &str) -> String {
        match fs::read_to_string(self.content_type_path(bucket, path)).await {
            Ok(content_type) if !content_type.trim().is_empty() => content_type.trim().to_string(),
            _ => guess_content_type(path),
        }
    }

    async fn write_content_type(&self, bucket: &str, path: &str, content_type: &str) -> StorageResult<()> {
        let sidecar = self.content_type_path(bucket, path);
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&sidecar, content_type).await?;
        Ok(())
    }
}

/// Write into a freshly created file, removing it again if the write fails
async fn write_new(mut file: fs::File, full_path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(cleanup) = fs::remove_file(full_path).await {
            tracing::warn!(path = %full_path.display(), error = %cleanup, "Failed to remove partial object");
        }
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn get(&self, bucket: &str, path: &str) -> StorageResult<StoredObject> {
        let full_path = self.object_path(bucket, path)?;

        match fs::read(&full_path).await {
            Ok(bytes) => {
                let content_type = self.read_content_type(bucket, path).await;
                Ok(StoredObject::new(bytes, content_type))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(bucket, path))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> StorageResult<()> {
        let full_path = self.object_path(bucket, path)?;

        // Create parent directories if they don't exist
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if overwrite {
            fs::write(&full_path, bytes).await?;
        } else {
            let file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&full_path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(StorageError::already_exists(bucket, path));
                }
                Err(e) => return Err(e.into()),
            };
            write_new(file, &full_path, bytes).await?;
        }
        self.write_content_type(bucket, path, content_type).await?;

        tracing::debug!(bucket = %bucket, path = %path, content_type = %content_type, size = bytes.len(), "Stored object");
        Ok(())
    }

    async fn exists(&self, bucket: &str, path: &str) -> StorageResult<bool> {
        let full_path = self.object_path(bucket, path)?;
        Ok(fs::try_exists(&full_path).await?)
    }

    fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> StorageResult<String> {
        validate_bucket(bucket)?;
        validate_object_path(path)?;
        Ok(self.signer.sign_url(bucket, path, ttl, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FilesystemObjectStore {
        let signer = UrlSigner::new("test-secret", "http://localhost:8080");
        FilesystemObjectStore::new(dir.path(), signer).unwrap()
    }

    #[tokio::test]
    async fn test_filesystem_put_get_roundtrip() -> StorageResult<()> {
        let temp_dir = TempDir::new()?;
        let storage = store(&temp_dir);

        storage
            .put("crm-files", "leads/1/contract.pdf", b"%PDF-1.7", "application/pdf", false)
            .await?;
        assert!(storage.exists("crm-files", "leads/1/contract.pdf").await?);

        let object = storage.get("crm-files", "leads/1/contract.pdf").await?;
        assert_eq!(object.bytes, b"%PDF-1.7");
        assert_eq!(object.content_type, "application/pdf");
        Ok(())
    }

    #[tokio::test]
    async fn test_filesystem_put_without_overwrite() -> StorageResult<()> {
        let temp_dir = TempDir::new()?;
        let storage = store(&temp_dir);

        storage.put("b", "a.txt", b"first", "text/plain", false).await?;
        let err = storage
            .put("b", "a.txt", b"second", "text/plain", false)
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(storage.get("b", "a.txt").await?.bytes, b"first");

        storage.put("b", "a.txt", b"third", "text/plain", true).await?;
        assert_eq!(storage.get("b", "a.txt").await?.bytes, b"third");
        Ok(())
    }

    #[tokio::test]
    async fn test_filesystem_keeps_content_type_without_extension() -> StorageResult<()> {
        let temp_dir = TempDir::new()?;
        let storage = store(&temp_dir);

        storage
            .put("crm-files", "scans/contract", b"%PDF-1.7", "application/pdf", false)
            .await?;
        assert_eq!(storage.get("crm-files", "scans/contract").await?.content_type, "application/pdf");

        storage
            .put("crm-files", "scans/contract", b"GIF89a", "image/gif", true)
            .await?;
        assert_eq!(storage.get("crm-files", "scans/contract").await?.content_type, "image/gif");

        // objects placed on disk by other tools still get a guessed type
        std::fs::write(temp_dir.path().join("crm-files").join("notes.txt"), b"hi")?;
        assert_eq!(storage.get("crm-files", "notes.txt").await?.content_type, "text/plain");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_new_write_leaves_no_object() -> StorageResult<()> {
        let temp_dir = TempDir::new()?;
        let full_path = temp_dir.path().join("partial.bin");
        std::fs::write(&full_path, b"")?;

        // a read-only handle makes the write fail
        let file = fs::File::open(&full_path).await?;
        assert!(write_new(file, &full_path, b"payload").await.is_err());
        assert!(!full_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_filesystem_missing_object() -> StorageResult<()> {
        let temp_dir = TempDir::new()?;
        let storage = store(&temp_dir);

        assert!(!storage.exists("b", "nope.bin").await?);
        let err = storage.get("b", "nope.bin").await.unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_filesystem_rejects_traversal() -> StorageResult<()> {
        let temp_dir = TempDir::new()?;
        let storage = store(&temp_dir);

        for path in ["../escape.txt", "/etc/passwd", "a/../../b", ""] {
            let err = storage.put("b", path, b"x", "text/plain", true).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath { .. }), "{path}");
        }
        assert!(storage.get("../b", "a.txt").await.is_err());
        Ok(())
    }

    #[test]
    fn test_signed_url_uses_signer() {
        let temp_dir = TempDir::new().unwrap();
        let storage = store(&temp_dir);
        let url = storage
            .signed_url("crm-backups", "backups/x/backup.json", Duration::seconds(30))
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/files/crm-backups/backups/x/backup.json?"));
        assert!(url.contains("signature="));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("a/b.json"), "application/json");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
