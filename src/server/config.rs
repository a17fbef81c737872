use std::path::PathBuf;

use super::RequestsLoggingLevel;
use crate::backup::MAX_PART_SIZE_BYTES;
use crate::config::{AppConfig, DEFAULT_MAX_RESTORE_PARTS};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    pub metrics_port: u16,
    /// When set, every `/api/admin` request must carry it as a bearer token.
    pub admin_token: Option<String>,
    pub uploads_path: PathBuf,
    pub backup_dir: PathBuf,
    pub max_part_size: u64,
    pub max_restore_parts: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            metrics_port: 9091,
            admin_token: None,
            uploads_path: PathBuf::from("uploads"),
            backup_dir: PathBuf::from("backups"),
            max_part_size: MAX_PART_SIZE_BYTES,
            max_restore_parts: DEFAULT_MAX_RESTORE_PARTS,
        }
    }
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
            metrics_port: config.metrics_port,
            admin_token: config.admin_token.clone(),
            uploads_path: config.uploads_path.clone(),
            backup_dir: config.backup_dir.clone(),
            max_part_size: config.backup.max_part_size_bytes(),
            max_restore_parts: config.backup.max_restore_parts,
        }
    }
}

impl ServerConfig {
    /// Largest multipart restore body accepted, with room for the form fields.
    ///
    /// Each part may be as large as a client accepts, even when this server
    /// writes smaller parts.
    pub fn restore_body_limit(&self, parts: usize) -> usize {
        const FORM_OVERHEAD: usize = 1024 * 1024;
        let part_limit = self.max_part_size.max(MAX_PART_SIZE_BYTES) as usize;
        part_limit
            .saturating_mul(parts)
            .saturating_add(FORM_OVERHEAD)
    }
}
