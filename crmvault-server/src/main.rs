use crmvault_core::{
    init_server_logging, Backends, BackupService, FilesystemObjectStore, LogContext,
    ModuleRegistry, StaticTokenAuthorizer, UrlSigner,
};
use crmvault_server::database::{DatabaseConnection, PgDatastore, PgJobStore};
use crmvault_server::{create_router, AppState, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    if let Err(e) = init_server_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let context = LogContext::new("server_startup", "crmvault-server");
    context.info("Starting CRMVault server");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;

    let database = DatabaseConnection::new(&config.database).await?;
    if config.database.run_migrations {
        database.run_migrations().await?;
    }

    let registry = ModuleRegistry::standard();
    let signer = UrlSigner::new(&config.storage.signing_secret, config.http.public_url.clone());
    let storage = FilesystemObjectStore::new(&config.storage.root, signer.clone())?;

    let backends = Backends {
        datastore: Arc::new(PgDatastore::new(database.pool().clone(), registry)),
        storage: Arc::new(storage),
        jobs: Arc::new(PgJobStore::new(database.pool().clone())),
        authorizer: Arc::new(StaticTokenAuthorizer::new(config.auth.tokens.clone())),
    };
    let service = BackupService::new(registry, config.engine.clone(), backends)?;

    let state = AppState::new(Arc::new(service), signer).with_database(database);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.http.bind).await?;
    info!("CRMVault server listening on http://{}", config.http.bind);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
