//! CRMVault Server Library
//!
//! HTTP surface over the backup engine, plus the PostgreSQL datastore and
//! job store it runs against in production.

pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
