//! Errors of the backup pipeline, shared by the server and the client.

use thiserror::Error;

use super::session::SessionState;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

fn mb(bytes: &u64) -> f64 {
    megabytes(*bytes)
}

/// Rejections raised before any byte leaves the client.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No backup files selected")]
    EmptySelection,

    #[error("{0} is not a .zip file")]
    NotZip(String),

    #[error(
        "{filename} is {:.2} MB, backup files must not exceed {} MB",
        mb(.size_bytes),
        mb(.limit_bytes)
    )]
    TooLarge {
        filename: String,
        size_bytes: u64,
        limit_bytes: u64,
    },
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{operation} failed with status {status}")]
    Transport {
        operation: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server reported failure: {0}")]
    Remote(String),

    #[error("Cannot start, a {0} operation is already in progress")]
    Busy(SessionState),

    #[error("Invalid backup archive: {0}")]
    InvalidArchive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_reports_megabytes_with_two_decimals() {
        let err = ValidationError::TooLarge {
            filename: "backup-part3.zip".to_string(),
            size_bytes: 22_020_096 + 1_000,
            limit_bytes: 20 * 1024 * 1024,
        };
        assert_eq!(
            err.to_string(),
            "backup-part3.zip is 21.00 MB, backup files must not exceed 20 MB"
        );
    }

    #[test]
    fn busy_names_the_running_operation() {
        let err = BackupError::Busy(SessionState::Restoring);
        assert!(err.to_string().contains("restore"));
    }
}
