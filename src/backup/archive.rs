//! Archive layout, part bookkeeping and the download envelope.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const ARCHIVE_FORMAT_VERSION: u32 = 1;
pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const DATABASE_DIR: &str = "database";
pub const FILES_DIR: &str = "files";

/// Describes the content of an archive, stored as `manifest.json` at its root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveManifest {
    pub format_version: u32,
    pub created_at: i64,
    pub tables: BTreeMap<String, u64>,
    pub file_count: u64,
    pub total_file_size: u64,
}

/// One downloadable chunk of a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivePart {
    /// 1-based position in the sequence.
    pub index: usize,
    pub filename: String,
    pub size: u64,
    pub sha256: String,
}

/// Response of `GET /api/admin/backup/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownloadManifest {
    Single { part: ArchivePart },
    Multipart { parts: Vec<ArchivePart> },
}

impl DownloadManifest {
    pub fn parts(&self) -> Vec<&ArchivePart> {
        match self {
            DownloadManifest::Single { part } => vec![part],
            DownloadManifest::Multipart { parts } => parts.iter().collect(),
        }
    }

    pub fn part_count(&self) -> usize {
        match self {
            DownloadManifest::Single { .. } => 1,
            DownloadManifest::Multipart { parts } => parts.len(),
        }
    }
}

/// A finished backup waiting to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub created_at: i64,
    pub total_size: u64,
    pub parts: Vec<ArchivePart>,
}

impl BackupArchive {
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn part(&self, index: usize) -> Option<&ArchivePart> {
        self.parts.iter().find(|p| p.index == index)
    }

    pub fn download_manifest(&self) -> DownloadManifest {
        match self.parts.as_slice() {
            [single] => DownloadManifest::Single {
                part: single.clone(),
            },
            parts => DownloadManifest::Multipart {
                parts: parts.to_vec(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub count: u64,
    pub total_size: u64,
}

/// Response of `GET /api/admin/backup/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub database: BTreeMap<String, u64>,
    pub files: FileStats,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn part_filename(base: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        format!("{}.zip", base)
    } else {
        format!("{}-part{}.zip", base, index)
    }
}
