//! Backup and restore of the marketplace state through portable ZIP archives.
//!
//! The server side packages the database tables and uploaded media into an
//! archive split into parts ([`packager`]) and applies uploaded archives back
//! ([`restore`]). Both stream [`ProgressEvent`]s while running. The client side
//! lives in [`crate::client`].

pub mod archive;
mod error;
pub mod options;
pub mod packager;
pub mod progress;
pub mod restore;
pub mod sequencer;
pub mod session;

pub use archive::{ArchivePart, BackupArchive, BackupStats, DownloadManifest, FileStats};
pub use error::{megabytes, BackupError, BackupResult, ValidationError};
pub use options::{DataDomain, RestoreOptions, RestoreRequestOptions};
pub use packager::ArchivePackager;
pub use progress::{progress_events, ProgressDecoder, ProgressEvent};
pub use restore::{RestoreEngine, RestoreSummary};
pub use sequencer::{SelectedFile, SelectedFileSet};
pub use session::{SessionGuard, SessionLock, SessionState};

pub const MAX_PART_SIZE_MB: u64 = 20;
pub const MAX_PART_SIZE_BYTES: u64 = MAX_PART_SIZE_MB * 1024 * 1024;
