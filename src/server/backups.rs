//! Server-side owner of the backup session, the pending archive and the restore engine.

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{error, info, warn};

use super::metrics;
use super::ServerConfig;
use crate::backup::restore::assemble_archive;
use crate::backup::{
    ArchivePackager, ArchivePart, BackupArchive, BackupError, BackupResult, BackupStats,
    DownloadManifest, ProgressEvent, RestoreEngine, RestoreOptions, RestoreSummary, SessionLock,
};
use crate::store::MarketStore;

pub struct BackupService {
    session: SessionLock,
    packager: ArchivePackager,
    engine: RestoreEngine,
    scratch_dir: PathBuf,
    pending: Mutex<Option<PendingBackup>>,
}

/// The archive offered for download and the parts already handed out.
struct PendingBackup {
    archive: BackupArchive,
    served: BTreeSet<usize>,
}

impl PendingBackup {
    fn is_fully_served(&self) -> bool {
        self.served.len() == self.archive.part_count()
    }
}

impl BackupService {
    pub fn new(store: Arc<dyn MarketStore>, config: &ServerConfig) -> Self {
        BackupService {
            session: SessionLock::new(),
            packager: ArchivePackager::new(
                store.clone(),
                &config.uploads_path,
                &config.backup_dir,
                config.max_part_size,
            ),
            engine: RestoreEngine::new(store, &config.uploads_path),
            scratch_dir: config.backup_dir.clone(),
            pending: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &SessionLock {
        &self.session
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingBackup>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> BackupResult<BackupStats> {
        self.packager.stats()
    }

    /// Packages a new archive and makes it the one offered for download.
    pub fn create<F: FnMut(ProgressEvent)>(&self, progress: F) -> BackupResult<BackupArchive> {
        let start = Instant::now();
        self.pending().take();
        match self.packager.package(progress) {
            Ok(archive) => {
                metrics::record_backup_run("success", start.elapsed());
                metrics::set_last_archive(archive.total_size, archive.part_count());
                *self.pending() = Some(PendingBackup {
                    archive: archive.clone(),
                    served: BTreeSet::new(),
                });
                Ok(archive)
            }
            Err(err) => {
                error!("Backup packaging failed: {}", err);
                metrics::record_backup_run("failure", start.elapsed());
                Err(err)
            }
        }
    }

    pub fn download_manifest(&self) -> Option<DownloadManifest> {
        self.pending()
            .as_ref()
            .map(|pending| pending.archive.download_manifest())
    }

    /// Opens the part with 1-based `index` of the pending archive.
    ///
    /// Once every part has been opened the archive is no longer offered and its
    /// files are removed; handles already open keep reading.
    pub fn open_part(&self, index: usize) -> io::Result<Option<(ArchivePart, File)>> {
        let mut pending = self.pending();
        let Some(backup) = pending.as_mut() else {
            return Ok(None);
        };
        let Some(part) = backup.archive.part(index).cloned() else {
            return Ok(None);
        };

        let file = File::open(self.packager.part_path(&part))?;
        backup.served.insert(index);
        if backup.is_fully_served() {
            if let Some(done) = pending.take() {
                info!(
                    "All {} part(s) downloaded, discarding backup",
                    done.archive.part_count()
                );
                self.remove_parts(&done.archive);
            }
        }
        Ok(Some((part, file)))
    }

    fn remove_parts(&self, archive: &BackupArchive) {
        for part in &archive.parts {
            if let Err(err) = std::fs::remove_file(self.packager.part_path(part)) {
                warn!("Failed to remove backup part {}: {}", part.filename, err);
            }
        }
    }

    /// Concatenates `parts` in order and applies the result.
    pub fn restore<B, F>(
        &self,
        parts: &[B],
        options: &RestoreOptions,
        progress: F,
    ) -> BackupResult<RestoreSummary>
    where
        B: AsRef<[u8]>,
        F: FnMut(ProgressEvent),
    {
        let kind = if parts.len() > 1 { "multipart" } else { "single" };
        let start = Instant::now();

        let result = assemble_archive(&self.scratch_dir, parts)
            .map_err(BackupError::from)
            .and_then(|archive| self.engine.restore(archive, options, progress));

        match &result {
            Ok(summary) => {
                info!(
                    "Restored {} rows and {} files from {} part(s)",
                    summary.rows_restored(),
                    summary.files_restored,
                    parts.len()
                );
                for (table, rows) in &summary.tables {
                    metrics::record_restored_rows(table, *rows);
                }
                metrics::record_restore_run(kind, "success", start.elapsed());
            }
            Err(err) => {
                error!("Restore failed: {}", err);
                metrics::record_restore_run(kind, "failure", start.elapsed());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ImportMode, MarketTable, MemMarketStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn service(dir: &TempDir, part_size: u64) -> (Arc<MemMarketStore>, BackupService) {
        let store = Arc::new(MemMarketStore::new());
        let config = ServerConfig {
            uploads_path: dir.path().join("uploads"),
            backup_dir: dir.path().join("backups"),
            max_part_size: part_size,
            ..Default::default()
        };
        let service = BackupService::new(store.clone(), &config);
        (store, service)
    }

    #[test]
    fn nothing_to_download_before_first_backup() {
        let dir = TempDir::new().unwrap();
        let (_, service) = service(&dir, 1024 * 1024);
        assert!(service.download_manifest().is_none());
        assert!(service.open_part(1).unwrap().is_none());
    }

    #[test]
    fn created_archive_is_offered_and_restorable() {
        let dir = TempDir::new().unwrap();
        let (store, service) = service(&dir, 256);
        let rows: Vec<_> = (0..20)
            .map(|i| {
                json!({"id": format!("g{}", i), "name": format!("Genre number {}", i)})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect();
        store
            .import_rows(MarketTable::Genres, &rows, ImportMode::Replace)
            .unwrap();

        let archive = service.create(|_| {}).unwrap();
        assert!(archive.part_count() > 1);
        let manifest = service.download_manifest().unwrap();
        assert_eq!(manifest.part_count(), archive.part_count());

        assert!(service.open_part(archive.part_count() + 1).unwrap().is_none());

        let parts: Vec<Vec<u8>> = (1..=archive.part_count())
            .map(|i| {
                let (part, mut file) = service.open_part(i).unwrap().unwrap();
                assert_eq!(part.index, i);
                let mut bytes = Vec::new();
                io::Read::read_to_end(&mut file, &mut bytes).unwrap();
                bytes
            })
            .collect();
        assert!(service.download_manifest().is_none());
        assert!(std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .all(|entry| !entry.unwrap().file_name().to_string_lossy().ends_with(".zip")));

        store.clear_table(MarketTable::Genres).unwrap();
        let summary = service
            .restore(&parts, &RestoreOptions::default(), |_| {})
            .unwrap();
        assert_eq!(summary.tables.get("genres"), Some(&20));
        assert_eq!(store.count_rows(MarketTable::Genres).unwrap(), 20);
    }

    #[test]
    fn new_backup_replaces_partly_downloaded_one() {
        let dir = TempDir::new().unwrap();
        let (_, service) = service(&dir, 1024 * 1024);

        let first = service.create(|_| {}).unwrap();
        let second = service.create(|_| {}).unwrap();

        assert_eq!(service.download_manifest(), Some(second.download_manifest()));
        assert_eq!(first.part_count(), 1);
        assert!(service.open_part(1).unwrap().is_some());
        assert!(service.download_manifest().is_none());
    }

    #[test]
    fn restore_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let (_, service) = service(&dir, 1024);
        let result = service.restore(&[b"not a zip".to_vec()], &RestoreOptions::default(), |_| {});
        assert!(result.is_err());
    }
}
