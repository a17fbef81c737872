mod file_config;

pub use file_config::{BackupConfig, FileConfig};

use crate::backup::MAX_PART_SIZE_MB;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_MAX_RESTORE_PARTS: usize = 64;

/// CLI arguments that can be used for config resolution.
/// Every field here can be overridden by the TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub uploads_path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub uploads_path: PathBuf,
    pub backup_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub admin_token: Option<String>,

    pub backup: BackupSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    pub max_part_size_mb: u64,
    pub max_restore_parts: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            max_part_size_mb: MAX_PART_SIZE_MB,
            max_restore_parts: DEFAULT_MAX_RESTORE_PARTS,
        }
    }
}

impl BackupSettings {
    pub fn max_part_size_bytes(&self) -> u64 {
        self.max_part_size_mb * 1024 * 1024
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;

        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let uploads_path = file
            .uploads_path
            .map(PathBuf::from)
            .or_else(|| cli.uploads_path.clone())
            .unwrap_or_else(|| data_dir.join("uploads"));
        let backup_dir = file
            .backup_dir
            .map(PathBuf::from)
            .or_else(|| cli.backup_dir.clone())
            .unwrap_or_else(|| data_dir.join("backups"));

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let admin_token = file
            .admin_token
            .or_else(|| cli.admin_token.clone())
            .filter(|token| !token.is_empty());

        let backup_file = file.backup.unwrap_or_default();
        let defaults = BackupSettings::default();
        let backup = BackupSettings {
            max_part_size_mb: backup_file
                .max_part_size_mb
                .unwrap_or(defaults.max_part_size_mb),
            max_restore_parts: backup_file
                .max_restore_parts
                .unwrap_or(defaults.max_restore_parts),
        };
        if backup.max_part_size_mb == 0 {
            bail!("backup.max_part_size_mb must be greater than zero");
        }
        // Clients refuse to upload parts above this size.
        if backup.max_part_size_mb > MAX_PART_SIZE_MB {
            bail!(
                "backup.max_part_size_mb must be at most {}, got {}",
                MAX_PART_SIZE_MB,
                backup.max_part_size_mb
            );
        }
        if backup.max_restore_parts == 0 {
            bail!("backup.max_restore_parts must be greater than zero");
        }

        Ok(Self {
            data_dir,
            uploads_path,
            backup_dir,
            port,
            metrics_port,
            logging_level,
            admin_token,
            backup,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("beatvault.db")
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
