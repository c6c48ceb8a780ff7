use thiserror::Error;
use uuid::Uuid;

/// Main result type for CRMVault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for CRMVault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// Authentication or authorization failed
    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    /// Malformed request, bundle or restore mode
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Reading a table failed during backup
    #[error("Extraction of table '{table}' failed: {message}")]
    Extraction { table: String, message: String },

    /// Serializing or uploading a backup artifact failed
    #[error("Archive error: {message}")]
    Archive { message: String },

    /// Deleting or writing a wanted table failed during restore
    #[error("Restore of table '{table}' failed during {operation}: {message}")]
    RestoreTable {
        table: String,
        operation: TableOperation,
        message: String,
    },

    /// Object storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Relational datastore errors
    #[error("Datastore error: {0}")]
    Datastore(#[from] DatastoreError),

    /// Job tracker persistence errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Requested record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A job ran and was recorded as failed
    #[error("Job {job_id} failed: {source}")]
    JobFailed {
        job_id: Uuid,
        #[source]
        source: Box<VaultError>,
    },

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors (should not normally occur)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Which half of a table restore failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOperation {
    Delete,
    Write,
}

impl std::fmt::Display for TableOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableOperation::Delete => write!(f, "delete"),
            TableOperation::Write => write!(f, "write"),
        }
    }
}

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented
    #[error("Authentication required")]
    MissingCredential,

    /// The credential does not resolve to a known actor
    #[error("Invalid credentials")]
    InvalidCredential,

    /// The actor is known but lacks the required role
    #[error("Actor '{actor}' is not allowed to perform {operation}")]
    Forbidden { actor: String, operation: String },
}

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object not found
    #[error("Object not found: {bucket}/{path}")]
    NotFound { bucket: String, path: String },

    /// Object already exists and overwriting was not requested
    #[error("Object already exists: {bucket}/{path}")]
    AlreadyExists { bucket: String, path: String },

    /// Path escapes the bucket or is otherwise unusable
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    /// I/O error
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Storage backend error
    #[error("Storage backend error: {backend} - {message}")]
    Backend { backend: String, message: String },
}

/// Relational datastore errors
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// A query against a table failed
    #[error("Query on '{table}' failed: {message}")]
    Query { table: String, message: String },

    /// A write or delete would break a foreign key
    #[error("Foreign key violation on '{table}': {message}")]
    ForeignKeyViolation { table: String, message: String },

    /// A plain insert collided with an existing row
    #[error("Unique violation on '{table}': {message}")]
    UniqueViolation { table: String, message: String },

    /// The table is not known to the datastore
    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    /// Connection-level failure
    #[error("Connection error: {message}")]
    Connection { message: String },
}

/// Non-fatal, per-file problems recorded in manifests and summaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileWarning {
    /// An attachment could not be copied into the backup area
    MigrationFailed { path: String, reason: String },
    /// An attachment was not written back during restore
    RestoreSkipped { path: String, reason: String },
}

impl std::fmt::Display for FileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileWarning::MigrationFailed { path, reason } => {
                write!(f, "attachment '{}' not backed up: {}", path, reason)
            }
            FileWarning::RestoreSkipped { path, reason } => {
                write!(f, "attachment '{}' skipped: {}", path, reason)
            }
        }
    }
}

/// Convenience methods for creating specific errors
impl VaultError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an extraction error for a table
    pub fn extraction(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an archive error
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Create a restore error for a table
    pub fn restore_table(
        table: impl Into<String>,
        operation: TableOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::RestoreTable {
            table: table.into(),
            operation,
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap an error that terminated a recorded job
    pub fn job_failed(job_id: Uuid, source: VaultError) -> Self {
        Self::JobFailed {
            job_id,
            source: Box::new(source),
        }
    }

    /// The error that caused a job failure, or the error itself
    pub fn root(&self) -> &VaultError {
        match self {
            VaultError::JobFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// The job id recorded for this failure, if any
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            VaultError::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

impl AuthError {
    /// Create a forbidden error
    pub fn forbidden(actor: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Forbidden {
            actor: actor.into(),
            operation: operation.into(),
        }
    }
}

impl StorageError {
    /// Create a not found error
    pub fn not_found(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Create an already exists error
    pub fn already_exists(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self::AlreadyExists {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Whether the object was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Whether a non-overwriting upload hit an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists { .. })
    }
}

impl DatastoreError {
    /// Create a query error
    pub fn query(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a referential-integrity violation
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, DatastoreError::ForeignKeyViolation { .. })
    }
}

/// Convert from standard I/O errors to StorageError
impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(error: serde_json::Error) -> Self {
        VaultError::Internal {
            message: format!("Serialization error: {}", error),
        }
    }
}
