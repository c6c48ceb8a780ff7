//! Tracing setup for the server and CLI, and per-job log contexts.
//!
//! Every backup and restore run is wrapped in a `job` span carrying the job
//! id, the job kind and the selected modules, so extractor, attachment and
//! table events can be filtered by job.

use crate::error::{Result, VaultError};
use crate::jobs::RestoreMode;
use std::io;
use tracing::field;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};
use uuid::Uuid;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// One JSON object per event
    Json,
    /// Single-line text for terminals
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(VaultError::config(format!(
                "Invalid log format '{}': expected text, json or compact",
                other
            ))),
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `crmvault_core=debug,sqlx=warn`
    pub filter: String,
    pub format: LogFormat,
    /// Include file and line of each event
    pub include_location: bool,
    /// Emit span open/close events, which carry the job fields
    pub include_spans: bool,
}

impl LogConfig {
    /// Quiet terminal output; `--verbose` lowers the level to debug
    pub fn cli<F>(verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_level = if verbose { "debug" } else { "warn" };
        Self {
            filter: lookup("RUST_LOG").unwrap_or_else(|| default_level.to_string()),
            format: LogFormat::Compact,
            include_location: false,
            include_spans: false,
        }
    }

    /// Server output; `LOG_FORMAT` selects text, json or compact
    pub fn server<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::Text,
        };
        Ok(Self {
            filter: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            format,
            include_location: true,
            include_spans: true,
        })
    }

    /// A bare level must be one of the tracing levels; longer directives are checked by `EnvFilter`
    pub fn validate(&self) -> Result<()> {
        let filter = self.filter.trim();
        if filter.is_empty() {
            return Err(VaultError::config("Log filter cannot be empty"));
        }
        let bare_level = !filter.contains(['=', ',', ':']);
        if bare_level && !LEVELS.contains(&filter.to_ascii_lowercase().as_str()) {
            return Err(VaultError::config(format!(
                "Invalid log level '{}': expected one of {}",
                filter,
                LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<()> {
    config.validate()?;

    let env_filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| VaultError::config(format!("Invalid log filter '{}': {}", config.filter, e)))?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let init_failed = |e: TryInitError| VaultError::config(format!("Failed to initialize logging: {}", e));

    match config.format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_span_events(span_events)
                    .with_writer(io::stderr),
            )
            .try_init()
            .map_err(init_failed)?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_span_events(span_events)
                    .with_writer(io::stderr),
            )
            .try_init()
            .map_err(init_failed)?,
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .try_init()
            .map_err(init_failed)?,
    }

    tracing::debug!(filter = %config.filter, format = ?config.format, "Logging initialized");
    Ok(())
}

/// CLI preset read from the process environment
pub fn init_cli_logging(verbose: bool) -> Result<()> {
    init_logging(&LogConfig::cli(verbose, |key| std::env::var(key).ok()))
}

/// Server preset read from the process environment
pub fn init_server_logging() -> Result<()> {
    init_logging(&LogConfig::server(|key| std::env::var(key).ok())?)
}

/// Identifier tying together the events of one run; a job's id when there is one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a log context is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Subject {
    /// A CLI command or server lifecycle step
    Operation { name: String, component: String },
    Backup { modules: Vec<String> },
    Restore { mode: RestoreMode, modules: Vec<String> },
}

/// Structured logging context for a command or a backup/restore job
#[derive(Debug, Clone)]
pub struct LogContext {
    correlation_id: CorrelationId,
    subject: Subject,
}

impl LogContext {
    /// Context for a CLI command or server lifecycle step
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            subject: Subject::Operation {
                name: operation.into(),
                component: component.into(),
            },
        }
    }

    /// Context for a backup job over the resolved module keys
    pub fn for_backup(job_id: Uuid, modules: &[String]) -> Self {
        Self {
            correlation_id: job_id.into(),
            subject: Subject::Backup {
                modules: modules.to_vec(),
            },
        }
    }

    /// Context for a restore job; empty `modules` means the bundle's selection
    pub fn for_restore(job_id: Uuid, mode: RestoreMode, modules: &[String]) -> Self {
        Self {
            correlation_id: job_id.into(),
            subject: Subject::Restore {
                mode,
                modules: modules.to_vec(),
            },
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// `backup`, `restore`, or the operation name
    pub fn kind(&self) -> &str {
        match &self.subject {
            Subject::Operation { name, .. } => name,
            Subject::Backup { .. } => "backup",
            Subject::Restore { .. } => "restore",
        }
    }

    /// Comma-separated module keys, `*` for an unrestricted selection
    pub fn modules(&self) -> Option<String> {
        let modules = match &self.subject {
            Subject::Operation { .. } => return None,
            Subject::Backup { modules } | Subject::Restore { modules, .. } => modules,
        };
        Some(if modules.is_empty() {
            "*".to_string()
        } else {
            modules.join(",")
        })
    }

    /// Span to instrument the run with; events inside it inherit the job fields
    pub fn span(&self) -> tracing::Span {
        match &self.subject {
            Subject::Operation { name, component } => tracing::info_span!(
                "operation",
                correlation_id = %self.correlation_id,
                operation = %name,
                component = %component,
            ),
            Subject::Backup { .. } | Subject::Restore { .. } => {
                let span = tracing::info_span!(
                    "job",
                    job_id = %self.correlation_id,
                    kind = %self.kind(),
                    modules = field::Empty,
                    mode = field::Empty,
                );
                if let Some(modules) = self.modules() {
                    span.record("modules", modules.as_str());
                }
                if let Subject::Restore { mode, .. } = &self.subject {
                    span.record("mode", field::display(mode));
                }
                span
            }
        }
    }

    pub fn info(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::info!("{}", message);
    }

    pub fn error(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_server_preset_reads_environment() {
        let config = LogConfig::server(env(&[])).unwrap();
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.include_spans);

        let config = LogConfig::server(env(&[("LOG_FORMAT", "json"), ("RUST_LOG", "crmvault_core=debug")])).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "crmvault_core=debug");
        assert!(config.validate().is_ok());

        assert!(LogConfig::server(env(&[("LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_cli_preset_verbosity() {
        assert_eq!(LogConfig::cli(false, env(&[])).filter, "warn");
        assert_eq!(LogConfig::cli(true, env(&[])).filter, "debug");
        assert_eq!(LogConfig::cli(true, env(&[("RUST_LOG", "trace")])).filter, "trace");
        assert_eq!(LogConfig::cli(false, env(&[])).format, LogFormat::Compact);
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let mut config = LogConfig::cli(false, env(&[]));
        config.filter = "DEBUG".into();
        assert!(config.validate().is_ok());
        config.filter = "loud".into();
        assert!(config.validate().is_err());
        config.filter = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backup_context_carries_job_fields() {
        let job_id = Uuid::new_v4();
        let context = LogContext::for_backup(job_id, &["leads".to_string(), "tasks".to_string()]);
        assert_eq!(context.correlation_id().as_str(), job_id.to_string());
        assert_eq!(context.kind(), "backup");
        assert_eq!(context.modules().as_deref(), Some("leads,tasks"));
    }

    #[test]
    fn test_restore_context_with_bundle_selection() {
        let context = LogContext::for_restore(Uuid::nil(), RestoreMode::Replace, &[]);
        assert_eq!(context.kind(), "restore");
        assert_eq!(context.modules().as_deref(), Some("*"));
    }

    #[test]
    fn test_operation_context() {
        let first = LogContext::new("server_startup", "crmvault-server");
        let second = LogContext::new("server_startup", "crmvault-server");
        assert_eq!(first.kind(), "server_startup");
        assert_eq!(first.modules(), None);
        assert_ne!(first.correlation_id(), second.correlation_id());
    }
}
