//! Server configuration.
//!
//! Loaded from an optional TOML file, then overridden by `CRMVAULT_*`
//! environment variables, then validated.

use crate::database::DatabaseConfig;
use crmvault_core::{EngineConfig, Result, Role, TokenGrant, VaultError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "crmvault-server.toml";

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to bind, e.g. `0.0.0.0:8080`
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Base URL under which `/files/...` download links are issued
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

/// Object storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; each bucket is a subdirectory
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Secret keying download URL signatures
    #[serde(default)]
    pub signing_secret: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            signing_secret: String::new(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/storage")
}

/// Bearer tokens accepted by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            VaultError::config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load from `path` (or the default file when present), apply the
    /// environment, and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override settings from environment lookups
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("CRMVAULT_BIND") {
            self.http.bind = bind;
        }
        if let Some(url) = lookup("CRMVAULT_PUBLIC_URL") {
            self.http.public_url = url;
        }
        if let Some(url) = lookup("CRMVAULT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(root) = lookup("CRMVAULT_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(secret) = lookup("CRMVAULT_SIGNING_SECRET") {
            self.storage.signing_secret = secret;
        }
        if let Some(token) = lookup("CRMVAULT_ADMIN_TOKEN") {
            self.auth.tokens.retain(|grant| grant.token != token);
            self.auth.tokens.push(TokenGrant {
                token,
                actor: "admin".to_string(),
                role: Role::Admin,
            });
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.http.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(VaultError::config(format!(
                "Invalid bind address: {}",
                self.http.bind
            )));
        }
        if !self.http.public_url.starts_with("http://") && !self.http.public_url.starts_with("https://") {
            return Err(VaultError::config(
                "public_url must start with http:// or https://",
            ));
        }
        if self.database.url.is_empty() {
            return Err(VaultError::config("database url cannot be empty"));
        }
        if self.storage.signing_secret.len() < 16 {
            return Err(VaultError::config(
                "signing_secret must be at least 16 characters",
            ));
        }
        if self.auth.tokens.iter().any(|grant| grant.token.trim().is_empty()) {
            return Err(VaultError::config("auth tokens cannot be empty"));
        }
        if !self.auth.tokens.iter().any(|grant| grant.role == Role::Admin) {
            return Err(VaultError::config(
                "at least one admin token is required (set CRMVAULT_ADMIN_TOKEN)",
            ));
        }
        self.engine.validate()
    }
}
