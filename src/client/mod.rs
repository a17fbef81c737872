//! Client side of the backup pipeline.

mod context;
mod manager;
mod sink;

pub use context::{ProgressSlot, RestoreContext};
pub use manager::{BackupRestoreManager, ClientConfig, BACKUP_API_PREFIX, DEFAULT_PART_INTERVAL};
pub use sink::{DirectorySink, DownloadSink};
