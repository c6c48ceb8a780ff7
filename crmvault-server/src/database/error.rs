//! Database error types and conversions

use crmvault_core::{DatastoreError, VaultError};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Query error: {message}")]
    Query { message: String },

    #[error("Migration error: {message}")]
    Migration { message: String },

    #[error("Deserialization error: {message}")]
    Deserialization { message: String },
}

impl From<DatabaseError> for VaultError {
    fn from(error: DatabaseError) -> Self {
        VaultError::persistence(error.to_string())
    }
}

/// Classify a sqlx error raised while working on `table`
pub fn table_error(table: &str, error: sqlx::Error) -> DatastoreError {
    match &error {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.kind() {
                sqlx::error::ErrorKind::ForeignKeyViolation => DatastoreError::ForeignKeyViolation {
                    table: table.to_string(),
                    message,
                },
                sqlx::error::ErrorKind::UniqueViolation => DatastoreError::UniqueViolation {
                    table: table.to_string(),
                    message,
                },
                // undefined_table
                _ if db_err.code().as_deref() == Some("42P01") => DatastoreError::UnknownTable {
                    table: table.to_string(),
                },
                _ => DatastoreError::query(table, message),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DatastoreError::Connection {
                message: error.to_string(),
            }
        }
        _ => DatastoreError::query(table, error.to_string()),
    }
}

/// Wrap a sqlx error from the job tables
pub fn query_error(error: sqlx::Error) -> DatabaseError {
    DatabaseError::Query {
        message: error.to_string(),
    }
}
