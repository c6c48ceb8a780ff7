//! Configuration management for the CRMVault CLI.
//!
//! Values come from `.crmvault.toml`, then `CRMVAULT_*` environment
//! variables, then command line flags, each overriding the previous.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = ".crmvault.toml";

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the CRMVault server
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

// Backups of large CRMs run inside the request
fn default_timeout_seconds() -> u64 {
    300
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// File holding the bearer token
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Bearer token (usually set via `CRMVAULT_TOKEN`)
    #[serde(default)]
    pub token: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load from `path` (or `.crmvault.toml` when present) and apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                match Self::from_file(Path::new(DEFAULT_CONFIG_FILE)) {
                    Ok(config) => config,
                    Err(e) => {
                        eprintln!("Warning: {:#}", e);
                        Self::default()
                    }
                }
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override settings from environment lookups
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CRMVAULT_SERVER_URL") {
            self.server.url = url;
        }
        if let Some(timeout) = lookup("CRMVAULT_TIMEOUT_SECONDS") {
            if let Ok(timeout_seconds) = timeout.parse::<u64>() {
                self.server.timeout_seconds = timeout_seconds;
            }
        }
        if let Some(token) = lookup("CRMVAULT_TOKEN") {
            self.auth.token = Some(token);
        }
    }

    /// The bearer token, read from `token_file` when not set directly
    pub fn token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.auth.token {
            return Ok(Some(token.trim().to_string()));
        }
        match &self.auth.token_file {
            Some(path) => {
                let token = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token file {}", path.display()))?;
                Ok(Some(token.trim().to_string()))
            }
            None => Ok(None),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.server.url.starts_with("http://") && !self.server.url.starts_with("https://") {
            bail!("Invalid server URL: must start with http:// or https://");
        }
        if self.server.timeout_seconds == 0 {
            bail!("Timeout must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:8080");
        assert_eq!(config.server.timeout_seconds, 300);
        assert!(config.auth.token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join(".crmvault.toml");
        let token_path = temp_dir.path().join("token");
        std::fs::write(&token_path, "file-token\n")?;

        let mut file = std::fs::File::create(&config_path)?;
        write!(
            file,
            r#"
[server]
url = "https://vault.example.com"
timeout_seconds = 60

[auth]
token_file = "{}"
"#,
            token_path.display()
        )?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config.server.url, "https://vault.example.com");
        assert_eq!(config.server.timeout_seconds, 60);
        assert_eq!(config.token()?, Some("file-token".to_string()));
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CRMVAULT_SERVER_URL", "https://crm.internal"),
            ("CRMVAULT_TIMEOUT_SECONDS", "15"),
            ("CRMVAULT_TOKEN", " env-token "),
        ]);

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.url, "https://crm.internal");
        assert_eq!(config.server.timeout_seconds, 15);
        assert_eq!(config.token()?, Some("env-token".to_string()));
        Ok(())
    }

    #[test]
    fn test_bad_timeout_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|key| (key == "CRMVAULT_TIMEOUT_SECONDS").then(|| "soon".to_string()));
        assert_eq!(config.server.timeout_seconds, 300);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.server.url = "ftp://vault".to_string();
        assert!(config.validate().is_err());
    }
}
