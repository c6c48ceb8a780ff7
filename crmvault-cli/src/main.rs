use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crmvault_core::api::{CreateBackupRequest, RestoreRequestBody};
use crmvault_core::{init_cli_logging, LogContext, RestoreMode};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

mod client;
mod config;
mod output;

use client::ApiClient;
use config::Config;

#[cfg(test)]
mod cli_tests;

#[derive(Parser)]
#[command(name = "crmvault")]
#[command(about = "Back up and restore the CRM dataset through a CRMVault server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server URL (overrides config and CRMVAULT_SERVER_URL)
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Bearer token (overrides config and CRMVAULT_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the modules that can be backed up
    Modules,

    /// Create a backup
    Backup {
        /// Modules to include, comma separated (default: all)
        #[arg(long, value_delimiter = ',')]
        modules: Vec<String>,

        /// Also copy referenced attachments
        #[arg(long)]
        files: bool,
    },

    /// List recent backups
    List {
        /// Number of backups to show (1-100)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one backup
    Show {
        /// Backup job ID
        id: Uuid,
    },

    /// Download a backup artifact
    Download {
        /// Backup job ID
        id: Uuid,

        /// Which artifact to fetch
        #[arg(long, value_enum, default_value_t = ArtifactKind::Json)]
        format: ArtifactKind,

        /// Output file (default: backup-<id>.<ext>)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Restore from a backup
    Restore {
        /// merge (upsert) or replace (clear, then insert)
        #[arg(long, value_enum)]
        mode: ModeArg,

        /// Modules to restore, comma separated (default: those in the backup)
        #[arg(long, value_delimiter = ',')]
        modules: Vec<String>,

        /// Backup job to restore from
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        backup_id: Option<Uuid>,

        /// Bundle path in the backup bucket to restore from
        #[arg(long)]
        file: Option<String>,

        /// Also write attachments back to primary storage
        #[arg(long)]
        files: bool,

        /// Confirm a replace restore, which deletes existing rows
        #[arg(long)]
        yes: bool,
    },

    /// List recent restores
    Restores {
        /// Number of restores to show (1-100)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one restore
    RestoreStatus {
        /// Restore job ID
        id: Uuid,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Merge,
    Replace,
}

impl From<ModeArg> for RestoreMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Merge => RestoreMode::Merge,
            ModeArg::Replace => RestoreMode::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ArtifactKind {
    Json,
    Xlsx,
}

impl ArtifactKind {
    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Json => "json",
            ArtifactKind::Xlsx => "xlsx",
        }
    }
}

/// Build the restore request body for the server
fn restore_body(
    mode: ModeArg,
    modules: &[String],
    backup_id: Option<Uuid>,
    file: Option<&str>,
    files: bool,
) -> RestoreRequestBody {
    RestoreRequestBody {
        mode: RestoreMode::from(mode).to_string(),
        include_modules: (!modules.is_empty()).then(|| modules.to_vec()),
        source_backup_id: backup_id.map(|id| id.to_string()),
        source_file_path: file.map(str::to_string),
        restore_files: Some(files),
    }
}

fn spinner(enabled: bool, message: &str) -> Option<ProgressBar> {
    if !enabled || !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(message.to_string());
    Some(bar)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, client: ApiClient) -> Result<()> {
    let context = LogContext::new("command", "crmvault-cli");
    let Some(command) = cli.command else {
        println!("CRMVault CLI - Use --help for available commands");
        return Ok(());
    };

    match command {
        Commands::Modules => {
            let response = client.modules().await?;
            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::modules_table(&response.modules));
        }
        Commands::Backup { modules, files } => {
            context.info("Creating backup");
            let request = CreateBackupRequest {
                include_modules: (!modules.is_empty()).then_some(modules),
                include_files: Some(files),
            };

            let bar = spinner(!cli.json, "Backing up CRM data...");
            let result = client.create_backup(&request).await;
            if let Some(bar) = &bar {
                bar.finish_and_clear();
            }
            let response = result?;

            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::backup_created(&response));
        }
        Commands::List { limit } => {
            let response = client.list_backups(limit).await?;
            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::backups_table(&response.backups));
        }
        Commands::Show { id } => {
            let response = client.get_backup(id).await?;
            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::backup_detail(&response.backup));
        }
        Commands::Download { id, format, output: path } => {
            let backup = client.get_backup(id).await?.backup;
            let url = match format {
                ArtifactKind::Json => backup.structured_url,
                ArtifactKind::Xlsx => backup.tabular_url,
            }
            .with_context(|| format!("Backup {} has no {} artifact", id, format.extension()))?;

            let bytes = client.download(&url).await?;
            let path = path.unwrap_or_else(|| {
                PathBuf::from(format!("backup-{}.{}", id, format.extension()))
            });
            write_artifact(&path, &bytes)?;
            println!("Saved {} bytes to {}", bytes.len(), path.display());
        }
        Commands::Restore {
            mode,
            modules,
            backup_id,
            file,
            files,
            yes,
        } => {
            if mode == ModeArg::Replace && !yes {
                bail!("Replace restore deletes existing rows in the restored tables; pass --yes to confirm");
            }
            context.info(&format!("Restoring in {} mode", RestoreMode::from(mode)));
            let body = restore_body(mode, &modules, backup_id, file.as_deref(), files);

            let bar = spinner(!cli.json, "Restoring CRM data...");
            let result = client.restore(&body).await;
            if let Some(bar) = &bar {
                bar.finish_and_clear();
            }
            let response = result?;

            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::restore_summary(response.restore_id, &response.summary));
        }
        Commands::Restores { limit } => {
            let response = client.list_restores(limit).await?;
            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::restores_table(&response.restores));
        }
        Commands::RestoreStatus { id } => {
            let response = client.get_restore(id).await?;
            if cli.json {
                return print_json(&response);
            }
            print!("{}", output::restore_detail(&response.restore));
        }
    }

    Ok(())
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_cli_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.server_url {
        config.server.url = url.clone();
    }
    if let Some(token) = &cli.token {
        config.auth.token = Some(token.clone());
    }
    config.validate()?;

    info!(server = %config.server.url, "Using CRMVault server");
    let client = ApiClient::new(
        &config.server.url,
        config.token()?,
        Duration::from_secs(config.server.timeout_seconds),
    )?;

    run(cli, client).await
}
