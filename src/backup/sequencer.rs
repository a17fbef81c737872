//! Selection validation and ordering of archive parts picked by an admin.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::error::ValidationError;
use super::MAX_PART_SIZE_BYTES;

lazy_static! {
    static ref PART_NUMBER: Regex = Regex::new(r"(?i)part(\d+)").expect("valid part regex");
}

/// A local archive file chosen for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

impl SelectedFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            filename,
            path,
            size,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::new(path, metadata.len()))
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    pub fn is_zip(&self) -> bool {
        is_zip(&self.filename)
    }
}

pub fn is_zip(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// First `partN` number in a filename, case-insensitive.
pub fn part_number(filename: &str) -> Option<u64> {
    PART_NUMBER
        .captures(filename)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Rejects the whole selection if any file is not a zip or is over `limit_bytes`.
pub fn validate_selection(files: &[SelectedFile], limit_bytes: u64) -> Result<(), ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    if let Some(file) = files.iter().find(|f| !f.is_zip()) {
        return Err(ValidationError::NotZip(file.filename.clone()));
    }
    if let Some(file) = files.iter().find(|f| f.size > limit_bytes) {
        return Err(ValidationError::TooLarge {
            filename: file.filename.clone(),
            size_bytes: file.size,
            limit_bytes,
        });
    }
    Ok(())
}

/// Orders parts by their `partN` number when every filename carries one,
/// by filename otherwise.
///
/// Gaps, duplicates and a missing `part1` are not detected.
pub fn sequence_parts(files: &mut [SelectedFile]) {
    let numbered: Option<Vec<u64>> = files.iter().map(|f| part_number(&f.filename)).collect();
    match numbered {
        Some(_) => files.sort_by(|a, b| {
            part_number(&a.filename)
                .cmp(&part_number(&b.filename))
                .then_with(|| a.filename.cmp(&b.filename))
        }),
        None => files.sort_by(|a, b| a.filename.cmp(&b.filename)),
    }
}

/// A validated, ordered selection ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectedFileSet {
    files: Vec<SelectedFile>,
}

impl SelectedFileSet {
    pub fn new(files: Vec<SelectedFile>) -> Result<Self, ValidationError> {
        Self::with_limit(files, MAX_PART_SIZE_BYTES)
    }

    pub fn with_limit(mut files: Vec<SelectedFile>, limit_bytes: u64) -> Result<Self, ValidationError> {
        validate_selection(&files, limit_bytes)?;
        sequence_parts(&mut files);
        Ok(Self { files })
    }

    pub async fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, crate::backup::BackupError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(SelectedFile::from_path(path).await?);
        }
        Ok(Self::new(files)?)
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_multipart(&self) -> bool {
        self.files.len() > 1
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn filenames(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.filename.as_str()).collect()
    }
}
