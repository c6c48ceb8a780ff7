//! PostgreSQL persistence for CRMVault Server
//!
//! Provides the connection pool, the table-level datastore the engine backs up
//! and restores, and the job store recording backup and restore runs.

// Declare submodules
pub mod config;
pub mod connection;
pub mod error;
pub mod job_store;
pub mod table_store;

// Re-export commonly used types for convenience
pub use config::DatabaseConfig;
pub use connection::DatabaseConnection;
pub use error::DatabaseError;
pub use job_store::PgJobStore;
pub use table_store::PgDatastore;
