//! Database connection pool management

use crate::database::{config::DatabaseConfig, error::DatabaseError};
use crmvault_core::Result;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, error, info};

/// PostgreSQL connection wrapper
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: PgPool,
    config: DatabaseConfig,
}

impl DatabaseConnection {
    /// Connect to PostgreSQL
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::Connection {
                message: format!("Failed to connect to PostgreSQL: {}", e),
            })?;

        info!("PostgreSQL connection established");
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, config: DatabaseConfig) -> Self {
        Self { pool, config }
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Create the job tables
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration {
                message: e.to_string(),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                debug!("PostgreSQL health check passed");
                true
            }
            Err(e) => {
                error!("PostgreSQL health check failed: {}", e);
                false
            }
        }
    }
}
