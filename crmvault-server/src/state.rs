use crate::database::DatabaseConnection;
use crmvault_core::{BackupService, ObjectStore, UrlSigner};
use std::sync::Arc;

pub struct AppState {
    pub service: Arc<BackupService>,
    pub storage: Arc<dyn ObjectStore>,
    pub signer: UrlSigner,
    /// Absent when running against in-memory backends
    pub database: Option<DatabaseConnection>,
}

impl AppState {
    pub fn new(service: Arc<BackupService>, signer: UrlSigner) -> Self {
        let storage = service.storage().clone();
        Self {
            service,
            storage,
            signer,
            database: None,
        }
    }

    pub fn with_database(mut self, database: DatabaseConnection) -> Self {
        self.database = Some(database);
        self
    }
}
