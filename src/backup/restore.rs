//! Applies an uploaded archive to the store and the uploads directory.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::archive::{ArchiveManifest, ARCHIVE_FORMAT_VERSION, DATABASE_DIR, FILES_DIR, MANIFEST_ENTRY};
use super::error::{BackupError, BackupResult};
use super::options::{DataDomain, RestoreOptions};
use super::progress::{ProgressEvent, COMPLETE_STEP};
use crate::store::{ImportMode, MarketStore, Row};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub tables: BTreeMap<String, usize>,
    pub files_restored: u64,
    pub files_skipped: u64,
}

impl RestoreSummary {
    pub fn rows_restored(&self) -> usize {
        self.tables.values().sum()
    }
}

/// Concatenates uploaded parts, in the given order, into a scratch file.
pub fn assemble_archive<B: AsRef<[u8]>>(scratch_dir: &Path, parts: &[B]) -> io::Result<File> {
    std::fs::create_dir_all(scratch_dir)?;
    let mut file = tempfile::tempfile_in(scratch_dir)?;
    for part in parts {
        file.write_all(part.as_ref())?;
    }
    file.rewind()?;
    Ok(file)
}

pub struct RestoreEngine {
    store: Arc<dyn MarketStore>,
    uploads_path: PathBuf,
}

impl RestoreEngine {
    pub fn new(store: Arc<dyn MarketStore>, uploads_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            uploads_path: uploads_path.into(),
        }
    }

    /// Restores the selected domains from `archive`.
    ///
    /// Domains are applied one after the other; a failure leaves the domains
    /// already applied in place.
    pub fn restore<R, F>(
        &self,
        archive: R,
        options: &RestoreOptions,
        mut progress: F,
    ) -> BackupResult<RestoreSummary>
    where
        R: Read + Seek,
        F: FnMut(ProgressEvent),
    {
        progress(ProgressEvent::new("start", "Reading backup archive"));
        let mut zip = ZipArchive::new(archive)
            .map_err(|e| BackupError::InvalidArchive(format!("not a readable zip ({})", e)))?;

        let manifest = read_manifest(&mut zip)?;
        progress(ProgressEvent::new(
            "validate",
            format!(
                "Backup from {} with {} media files",
                chrono::DateTime::from_timestamp(manifest.created_at, 0)
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| manifest.created_at.to_string()),
                manifest.file_count
            ),
        ));

        let mode = if options.overwrite_existing {
            ImportMode::Replace
        } else {
            ImportMode::Merge
        };

        let mut summary = RestoreSummary::default();
        for domain in options.selected_domains() {
            let Some(table) = domain.table() else {
                continue;
            };
            let entry = format!("{}/{}.json", DATABASE_DIR, table);
            let rows: Vec<Row> = match zip.by_name(&entry) {
                Ok(file) => serde_json::from_reader(file)?,
                Err(zip::result::ZipError::FileNotFound) => {
                    progress(ProgressEvent::new(
                        "database",
                        format!("No {} in backup, skipped", table),
                    ));
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if options.overwrite_existing {
                self.store.clear_table(table)?;
            }
            let written = self.store.import_rows(table, &rows, mode)?;
            progress(ProgressEvent::new(
                "database",
                format!("Restored {} of {} {} rows", written, rows.len(), table),
            ));
            summary.tables.insert(table.to_string(), written);
        }

        if options.includes(DataDomain::Files) {
            self.restore_files(&mut zip, options.overwrite_existing, &mut summary)?;
            progress(ProgressEvent::new(
                "files",
                format!(
                    "Restored {} media files ({} already present)",
                    summary.files_restored, summary.files_skipped
                ),
            ));
        }

        info!(
            "Restore applied: {} rows, {} files",
            summary.rows_restored(),
            summary.files_restored
        );
        progress(ProgressEvent::new(
            COMPLETE_STEP,
            format!(
                "Restore complete: {} rows and {} files restored",
                summary.rows_restored(),
                summary.files_restored
            ),
        ));
        Ok(summary)
    }

    fn restore_files<R: Read + Seek>(
        &self,
        zip: &mut ZipArchive<R>,
        overwrite: bool,
        summary: &mut RestoreSummary,
    ) -> BackupResult<()> {
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(enclosed) = entry.enclosed_name() else {
                warn!("Skipping archive entry with unsafe path: {}", entry.name());
                continue;
            };
            let Ok(relative) = enclosed.strip_prefix(FILES_DIR) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
                warn!("Skipping archive entry with unsafe path: {}", entry.name());
                continue;
            }

            let target = self.uploads_path.join(relative);
            if target.exists() && !overwrite {
                summary.files_skipped += 1;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            debug!("Restored upload {:?}", relative);
            summary.files_restored += 1;
        }
        Ok(())
    }
}

fn read_manifest<R: Read + Seek>(zip: &mut ZipArchive<R>) -> BackupResult<ArchiveManifest> {
    let file = zip
        .by_name(MANIFEST_ENTRY)
        .map_err(|_| BackupError::InvalidArchive(format!("{} is missing", MANIFEST_ENTRY)))?;
    let manifest: ArchiveManifest = serde_json::from_reader(file)
        .map_err(|e| BackupError::InvalidArchive(format!("unreadable {} ({})", MANIFEST_ENTRY, e)))?;
    if manifest.format_version > ARCHIVE_FORMAT_VERSION {
        return Err(BackupError::InvalidArchive(format!(
            "format version {} is newer than supported version {}",
            manifest.format_version, ARCHIVE_FORMAT_VERSION
        )));
    }
    Ok(manifest)
}
