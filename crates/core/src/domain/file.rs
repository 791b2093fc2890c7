// Uploaded File Records

use super::error::{DomainError, Result};
use super::job::OUTPUT_DIR_NAME;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MAX_LABEL_LEN: usize = 64;
const MAX_FILENAME_LEN: usize = 255;

/// Stored file format (allow-list of upload extensions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Txt,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Txt => "txt",
        }
    }

    /// Parse an extension without the leading dot, ignoring case
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "tsv" => Ok(FileFormat::Tsv),
            "txt" => Ok(FileFormat::Txt),
            _ => Err(DomainError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Infer the format from a caller-supplied filename such as `genes.CSV`
    pub fn from_filename(filename: &str) -> Result<Self> {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => Err(DomainError::UnsupportedFormat(filename.to_string())),
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Check an entity label (it becomes a file stem on disk)
pub fn validate_label(label: &str) -> Result<()> {
    let ok = !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(DomainError::InvalidLabel(label.to_string()))
    }
}

/// Check a label-file name. It is kept verbatim, so it must be a plain name
/// inside the job directory: no separators, no hidden or staging names.
pub fn validate_filename(filename: &str) -> Result<()> {
    let invalid = filename.is_empty()
        || filename.len() > MAX_FILENAME_LEN
        || filename.starts_with('.')
        || filename == OUTPUT_DIR_NAME
        || filename.contains(&['/', '\\', '\0'][..]);
    if invalid {
        Err(DomainError::InvalidFilename(filename.to_string()))
    } else {
        Ok(())
    }
}

/// Name an entity file is stored under: `<label>.<ext>`
pub fn entity_file_name(label: &str, format: FileFormat) -> String {
    format!("{}.{}", label, format.extension())
}

/// File saved under a caller-chosen logical label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFile {
    pub label: String,
    pub format: FileFormat,
    pub path: PathBuf,
    pub size: u64,
    pub saved_at: i64, // epoch ms
}

impl EntityFile {
    pub fn file_name(&self) -> String {
        entity_file_name(&self.label, self.format)
    }
}

/// The single per-job file kept under its original name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFile {
    pub original_filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub saved_at: i64, // epoch ms
}
