//! Plain-text rendering of server responses

use crmvault_core::api::{BackupListItem, CreateBackupResponse, ModuleInfo};
use crmvault_core::{BackupSummary, RestoreJob, RestoreSource, RestoreSummary, TableAction};
use std::fmt::Write;
use uuid::Uuid;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn action_label(action: TableAction) -> &'static str {
    match action {
        TableAction::Upsert => "upserted",
        TableAction::Insert => "inserted",
        TableAction::Cleared => "cleared",
    }
}

fn modules_label(modules: &[String]) -> String {
    if modules.is_empty() {
        "all".to_string()
    } else {
        modules.join(",")
    }
}

pub fn modules_table(modules: &[ModuleInfo]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<24} TABLES", "MODULE", "LABEL");
    for module in modules {
        let _ = writeln!(
            out,
            "{:<16} {:<24} {}",
            module.key,
            module.label,
            module.tables.join(", ")
        );
    }
    out
}

fn counts(out: &mut String, summary: &BackupSummary) {
    let total: u64 = summary.counts.values().sum();
    let _ = writeln!(out, "Rows: {} across {} tables", total, summary.counts.len());
    for (table, rows) in &summary.counts {
        let _ = writeln!(out, "  {:<24} {}", table, rows);
    }
    if let Some(files) = &summary.files {
        let _ = writeln!(
            out,
            "Attachments: {} copied, {} failed of {}",
            files.copied, files.failed, files.attempted
        );
    }
    for warning in &summary.warnings {
        let _ = writeln!(out, "Warning: {}", warning);
    }
}

pub fn backup_created(response: &CreateBackupResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup {} created", response.backup_id);
    counts(&mut out, &response.result_summary);
    let _ = writeln!(out, "JSON:  {}", response.artifacts.structured.url);
    let _ = writeln!(out, "Excel: {}", response.artifacts.tabular.url);
    out
}

pub fn backups_table(backups: &[BackupListItem]) -> String {
    if backups.is_empty() {
        return "No backups found\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<36}  {:<19}  {:<8}  {:<24}  {:>8}  MODULES",
        "ID", "CREATED", "STATUS", "BY", "ROWS"
    );
    for backup in backups {
        let rows: u64 = backup
            .result_summary
            .as_ref()
            .map(|s| s.counts.values().sum())
            .unwrap_or(0);
        let _ = writeln!(
            out,
            "{:<36}  {:<19}  {:<8}  {:<24}  {:>8}  {}",
            backup.id,
            backup.created_at.format(TIME_FORMAT),
            backup.status,
            backup.created_by,
            rows,
            modules_label(&backup.include_modules)
        );
    }
    out
}

pub fn backup_detail(backup: &BackupListItem) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup {}", backup.id);
    let _ = writeln!(out, "Status:  {}", backup.status);
    let _ = writeln!(out, "Created: {} by {}", backup.created_at.format(TIME_FORMAT), backup.created_by);
    if let Some(finished) = backup.finished_at {
        let _ = writeln!(out, "Finished: {}", finished.format(TIME_FORMAT));
    }
    let _ = writeln!(out, "Modules: {}", modules_label(&backup.include_modules));
    if let Some(error) = &backup.error_message {
        let _ = writeln!(out, "Error:   {}", error);
    }
    if let Some(summary) = &backup.result_summary {
        counts(&mut out, summary);
    }
    if let Some(url) = &backup.structured_url {
        let _ = writeln!(out, "JSON:  {}", url);
    }
    if let Some(url) = &backup.tabular_url {
        let _ = writeln!(out, "Excel: {}", url);
    }
    out
}

pub fn restore_summary(restore_id: Uuid, summary: &RestoreSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Restore {} finished ({} mode)", restore_id, summary.mode);
    for table in &summary.tables_processed {
        let _ = writeln!(
            out,
            "  {:<24} {:>8}  {}",
            table.table,
            table.rows,
            action_label(table.action)
        );
    }
    if let Some(files) = &summary.file_restore {
        let _ = writeln!(
            out,
            "Attachments: {} restored, {} skipped",
            files.restored, files.skipped
        );
    }
    for warning in &summary.warnings {
        let _ = writeln!(out, "Warning: {}", warning);
    }
    out
}

fn source_label(source: &RestoreSource) -> String {
    match source {
        RestoreSource::BackupJob { backup_id } => format!("backup {}", backup_id),
        RestoreSource::ArtifactPath { path } => path.clone(),
    }
}

pub fn restores_table(restores: &[RestoreJob]) -> String {
    if restores.is_empty() {
        return "No restores found\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<36}  {:<19}  {:<8}  {:<7}  SOURCE",
        "ID", "CREATED", "STATUS", "MODE"
    );
    for restore in restores {
        let _ = writeln!(
            out,
            "{:<36}  {:<19}  {:<8}  {:<7}  {}",
            restore.id,
            restore.created_at.format(TIME_FORMAT),
            restore.status,
            restore.mode,
            source_label(&restore.source)
        );
    }
    out
}

pub fn restore_detail(restore: &RestoreJob) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Restore {}", restore.id);
    let _ = writeln!(out, "Status:  {}", restore.status);
    let _ = writeln!(out, "Created: {} by {}", restore.created_at.format(TIME_FORMAT), restore.created_by);
    let _ = writeln!(out, "Source:  {}", source_label(&restore.source));
    let _ = writeln!(out, "Modules: {}", modules_label(&restore.include_modules));
    if let Some(error) = &restore.error_message {
        let _ = writeln!(out, "Error:   {}", error);
    }
    if let Some(summary) = &restore.result_summary {
        out.push_str(&restore_summary(restore.id, summary));
    }
    out
}
