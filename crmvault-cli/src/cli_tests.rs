//! Tests for CLI command parsing and request building

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;
    use uuid::Uuid;

    use crate::{restore_body, ArtifactKind, Cli, Commands, ModeArg};

    #[test]
    fn test_cli_parsing_no_args() {
        let cli = Cli::try_parse_from(["crmvault"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(!cli.json);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parsing_global_flags() {
        let cli = Cli::try_parse_from([
            "crmvault",
            "list",
            "--verbose",
            "--config",
            "/etc/crmvault.toml",
            "--server-url",
            "https://vault.example.com",
            "--token",
            "abc",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/crmvault.toml")));
        assert_eq!(cli.server_url.as_deref(), Some("https://vault.example.com"));
        assert_eq!(cli.token.as_deref(), Some("abc"));
        assert!(matches!(cli.command, Some(Commands::List { limit: None })));
    }

    #[test]
    fn test_cli_parsing_backup_command() {
        let cli = Cli::try_parse_from(["crmvault", "backup", "--modules", "leads,tasks", "--files"]).unwrap();
        match cli.command {
            Some(Commands::Backup { modules, files }) => {
                assert_eq!(modules, vec!["leads".to_string(), "tasks".to_string()]);
                assert!(files);
            }
            _ => panic!("Expected Backup command"),
        }

        let cli = Cli::try_parse_from(["crmvault", "backup"]).unwrap();
        match cli.command {
            Some(Commands::Backup { modules, files }) => {
                assert!(modules.is_empty());
                assert!(!files);
            }
            _ => panic!("Expected Backup command"),
        }
    }

    #[test]
    fn test_cli_parsing_restore_command() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from([
            "crmvault",
            "restore",
            "--mode",
            "replace",
            "--backup-id",
            id_arg.as_str(),
            "--modules",
            "leads",
            "--yes",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Restore { mode, modules, backup_id, file, files, yes }) => {
                assert_eq!(mode, ModeArg::Replace);
                assert_eq!(modules, vec!["leads".to_string()]);
                assert_eq!(backup_id, Some(id));
                assert_eq!(file, None);
                assert!(!files);
                assert!(yes);
            }
            _ => panic!("Expected Restore command"),
        }
    }

    #[test]
    fn test_restore_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["crmvault", "restore", "--mode", "merge"]).is_err());

        let id = Uuid::new_v4().to_string();
        let both = Cli::try_parse_from([
            "crmvault",
            "restore",
            "--mode",
            "merge",
            "--backup-id",
            id.as_str(),
            "--file",
            "backups/x/backup.json",
        ]);
        assert!(both.is_err());

        let file_only = Cli::try_parse_from([
            "crmvault",
            "restore",
            "--mode",
            "merge",
            "--file",
            "backups/x/backup.json",
        ]);
        assert!(file_only.is_ok());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let cli = Cli::try_parse_from([
            "crmvault",
            "restore",
            "--mode",
            "overwrite",
            "--file",
            "backups/x/backup.json",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_cli_parsing_download_command() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from(["crmvault", "download", id_arg.as_str(), "--format", "xlsx"]).unwrap();
        match cli.command {
            Some(Commands::Download { id: parsed, format, output }) => {
                assert_eq!(parsed, id);
                assert_eq!(format, ArtifactKind::Xlsx);
                assert_eq!(output, None);
            }
            _ => panic!("Expected Download command"),
        }
    }

    #[test]
    fn test_restore_body() {
        let id = Uuid::new_v4();
        let body = restore_body(ModeArg::Merge, &[], Some(id), None, true);
        assert_eq!(body.mode, "merge");
        assert_eq!(body.include_modules, None);
        assert_eq!(body.source_backup_id, Some(id.to_string()));
        assert_eq!(body.source_file_path, None);
        assert_eq!(body.restore_files, Some(true));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sourceBackupId"], id.to_string());
        assert_eq!(json["restoreFiles"], true);

        let body = restore_body(
            ModeArg::Replace,
            &["tasks".to_string()],
            None,
            Some("backups/x/backup.json"),
            false,
        );
        assert_eq!(body.mode, "replace");
        assert_eq!(body.include_modules, Some(vec!["tasks".to_string()]));
        assert_eq!(body.source_file_path.as_deref(), Some("backups/x/backup.json"));
    }
}
