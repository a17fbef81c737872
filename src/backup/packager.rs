//! Serializes the marketplace into a ZIP archive split into download parts.
//!
//! Runs synchronously; the server drives it from a blocking task and forwards
//! the progress callbacks into the response stream.

use chrono::Utc;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::archive::{
    part_filename, sha256_hex, ArchiveManifest, ArchivePart, BackupArchive, BackupStats,
    FileStats, ARCHIVE_FORMAT_VERSION, DATABASE_DIR, FILES_DIR, MANIFEST_ENTRY,
};
use super::error::BackupResult;
use super::progress::{ProgressEvent, COMPLETE_STEP};
use crate::store::{MarketStore, MarketTable};

pub const ARCHIVE_BASE_NAME: &str = "beatvault-backup";

struct UploadedFile {
    path: PathBuf,
    relative: String,
    size: u64,
}

pub struct ArchivePackager {
    store: Arc<dyn MarketStore>,
    uploads_path: PathBuf,
    backup_dir: PathBuf,
    part_size: u64,
}

impl ArchivePackager {
    pub fn new(
        store: Arc<dyn MarketStore>,
        uploads_path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        part_size: u64,
    ) -> Self {
        Self {
            store,
            uploads_path: uploads_path.into(),
            backup_dir: backup_dir.into(),
            part_size: part_size.max(1),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn part_path(&self, part: &ArchivePart) -> PathBuf {
        self.backup_dir.join(&part.filename)
    }

    pub fn stats(&self) -> BackupResult<BackupStats> {
        let mut database = BTreeMap::new();
        for table in MarketTable::ALL {
            database.insert(table.to_string(), self.store.count_rows(table)?);
        }
        let files = self.uploaded_files();
        Ok(BackupStats {
            database,
            files: FileStats {
                count: files.len() as u64,
                total_size: files.iter().map(|f| f.size).sum(),
            },
        })
    }

    fn uploaded_files(&self) -> Vec<UploadedFile> {
        if !self.uploads_path.is_dir() {
            return Vec::new();
        }
        WalkDir::new(&self.uploads_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable upload entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry
                    .path()
                    .strip_prefix(&self.uploads_path)
                    .ok()?
                    .to_string_lossy()
                    .replace('\\', "/");
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                Some(UploadedFile {
                    path: entry.path().to_path_buf(),
                    relative,
                    size,
                })
            })
            .collect()
    }

    /// Builds a fresh archive, replacing any previous one in the backup directory.
    pub fn package<F: FnMut(ProgressEvent)>(&self, mut progress: F) -> BackupResult<BackupArchive> {
        let created_at = Utc::now().timestamp();
        progress(ProgressEvent::new("start", "Starting backup"));

        std::fs::create_dir_all(&self.backup_dir)?;
        let mut zip = ZipWriter::new(tempfile::tempfile_in(&self.backup_dir)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut tables = BTreeMap::new();
        for table in MarketTable::ALL {
            let rows = self.store.export_rows(table)?;
            progress(ProgressEvent::new(
                "database",
                format!("Exported {} {} rows", rows.len(), table),
            ));
            zip.start_file(format!("{}/{}.json", DATABASE_DIR, table), options)?;
            serde_json::to_writer(&mut zip, &rows)?;
            tables.insert(table.to_string(), rows.len() as u64);
        }

        let files = self.uploaded_files();
        let mut total_file_size = 0;
        for file in &files {
            zip.start_file(format!("{}/{}", FILES_DIR, file.relative), options)?;
            let mut source = File::open(&file.path)?;
            total_file_size += io::copy(&mut source, &mut zip)?;
            debug!("Archived upload {}", file.relative);
        }
        progress(ProgressEvent::new(
            "files",
            format!(
                "Added {} media files ({:#})",
                files.len(),
                byte_unit::Byte::from(total_file_size)
            ),
        ));

        let manifest = ArchiveManifest {
            format_version: ARCHIVE_FORMAT_VERSION,
            created_at,
            tables,
            file_count: files.len() as u64,
            total_file_size,
        };
        zip.start_file(MANIFEST_ENTRY, options)?;
        zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;

        let mut archive_file = zip.finish()?;
        let total_size = archive_file.seek(SeekFrom::End(0))?;
        archive_file.rewind()?;
        progress(ProgressEvent::new(
            "finalize",
            format!("Archive is {:#}", byte_unit::Byte::from(total_size)),
        ));

        self.discard_previous()?;
        let base = format!(
            "{}-{}",
            ARCHIVE_BASE_NAME,
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let parts = self.write_parts(&mut archive_file, total_size, &base)?;
        if parts.len() > 1 {
            progress(ProgressEvent::new(
                "split",
                format!(
                    "Split into {} parts of at most {:#}",
                    parts.len(),
                    byte_unit::Byte::from(self.part_size)
                ),
            ));
        }

        info!(
            "Backup created: {} bytes in {} part(s)",
            total_size,
            parts.len()
        );
        progress(ProgressEvent::new(
            COMPLETE_STEP,
            format!("Backup ready to download ({} part(s))", parts.len()),
        ));

        Ok(BackupArchive {
            created_at,
            total_size,
            parts,
        })
    }

    fn write_parts(
        &self,
        archive_file: &mut File,
        total_size: u64,
        base: &str,
    ) -> BackupResult<Vec<ArchivePart>> {
        let total_parts = total_size.div_ceil(self.part_size).max(1) as usize;
        let mut parts = Vec::with_capacity(total_parts);
        for index in 1..=total_parts {
            let mut chunk = Vec::new();
            (&mut *archive_file)
                .take(self.part_size)
                .read_to_end(&mut chunk)?;

            let filename = part_filename(base, index, total_parts);
            std::fs::write(self.backup_dir.join(&filename), &chunk)?;
            parts.push(ArchivePart {
                index,
                filename,
                size: chunk.len() as u64,
                sha256: sha256_hex(&chunk),
            });
        }
        Ok(parts)
    }

    /// Removes part files left by an earlier backup.
    pub fn discard_previous(&self) -> io::Result<()> {
        if !self.backup_dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            let is_part = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(ARCHIVE_BASE_NAME) && n.ends_with(".zip"))
                .unwrap_or(false);
            if is_part && path.is_file() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
