//! Destinations for downloaded archive parts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::backup::{ArchivePart, BackupResult};

/// Receives each downloaded part once, in sequence order.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn deliver(&self, part: &ArchivePart, bytes: &[u8]) -> BackupResult<()>;
}

/// Saves parts under their server-provided filenames in a local directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Strips any directory components a filename might carry.
    fn target(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| "backup.zip".into());
        self.dir.join(name)
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn deliver(&self, part: &ArchivePart, bytes: &[u8]) -> BackupResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.target(&part.filename);
        let mut file = File::create(&target).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        info!("Saved {} ({} bytes) to {:?}", part.filename, bytes.len(), target);
        Ok(())
    }
}
