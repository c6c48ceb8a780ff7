pub mod error;
pub mod logging;
pub mod config;
pub mod registry;
pub mod datastore;
pub mod extractor;
pub mod bundle;
pub mod workbook;
pub mod crypto;
pub mod storage;
pub mod attachments;
pub mod archiver;
pub mod restore;
pub mod jobs;
pub mod auth;
pub mod api;
pub mod service;
pub mod memory;


pub use error::{
    AuthError, DatastoreError, FileWarning, Result, StorageError, TableOperation, VaultError,
};
pub use logging::{CorrelationId, LogConfig, LogContext, LogFormat, init_cli_logging, init_logging, init_server_logging};
pub use config::EngineConfig;
pub use registry::{ModuleDefinition, ModuleRegistry, OrderedTables, ForeignKey, AttachmentSource};
pub use datastore::{Datastore, DatastoreResult, Row, column_union};
pub use extractor::TableExtractor;
pub use bundle::{Bundle, BundleMeta, FileManifest, ManifestEntry};
pub use workbook::render_workbook;
pub use crypto::{UrlSigner, content_checksum, verify_checksum, secure_compare};
pub use storage::{ObjectStore, StoredObject, StorageResult, FilesystemObjectStore};
pub use attachments::{AttachmentMigrator, MigrationOutcome};
pub use archiver::{ArtifactRef, BackupArchiver, BackupOutcome, BackupRequest};
pub use restore::{RestoreOrchestrator, RestoreOutcome, RestoreRequest};
pub use jobs::{
    BackupJob, BackupSummary, JobStatus, JobStore, RestoreJob, RestoreMode, RestoreSource,
    RestoreSummary, TableAction, TableRestoreResult, FileRestoreStats, FileBackupStats,
};
pub use auth::{Actor, AuthGuard, Authorizer, Role, StaticTokenAuthorizer, TokenGrant};
pub use service::{Backends, BackupService};
pub use memory::{MemoryDatastore, MemoryJobStore, MemoryObjectStore};
