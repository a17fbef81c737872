//! beatvault: backup and restore of a beat marketplace.
//!
//! The library exposes the archive pipeline, the HTTP server serving it and
//! the client driving it, for the two binaries and the integration tests.

pub mod backup;
pub mod client;
pub mod config;
pub mod server;
pub mod sqlite_persistence;
pub mod store;

// Re-export commonly used types for convenience
pub use backup::{BackupError, BackupResult, DownloadManifest, ProgressEvent, RestoreOptions};
pub use client::{BackupRestoreManager, ClientConfig};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use store::{MarketStore, MarketTable, MemMarketStore, SqliteMarketStore};
