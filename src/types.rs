//! Core types and data structures for repoark
//!
//! This module contains the data model shared by the enumerator, the archive
//! codec and the restore reconciler.
//!
//! ## Key Types
//!
//! - **Traversal**: `RootDir` - one repository or submodule awaiting enumeration
//! - **Entries**: `ArchiveEntry`, `EntryHeader`, `EntryKind` - what goes into and comes out of an archive
//! - **Restore**: `RestoreDecision`, `ExtractedPathSet`, `RestoreResult`
//! - **Configuration**: `ArkConfig` - operation parameters
//! - **Reporting**: `ArchiveSummary`, `ProgressInfo`
//!
//! ## Examples
//!
//! ```rust
//! use repoark::types::ArkConfig;
//!
//! let config = ArkConfig {
//!     compression_level: 9,
//!     ..Default::default()
//! };
//! assert_eq!(config.metadata_dir, ".git");
//! ```

use crate::error::{ArkError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A repository root waiting in the enumeration work-queue
///
/// The top-level repository has an empty prefix. Each submodule discovered
/// during enumeration becomes a new `RootDir` whose prefix is the submodule's
/// full archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDir {
    /// Archive-internal path prefix (empty for the top-level repository)
    pub prefix: String,
    /// Absolute filesystem path of the repository root
    pub dir: PathBuf,
}

impl RootDir {
    /// Root entry for the top-level repository
    pub fn top_level(dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: String::new(),
            dir: dir.into(),
        }
    }
}

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file; the only kind the writer produces
    File,
    /// Directory; accepted when reading, never written
    Directory,
}

/// A file selected for archiving
///
/// Only the size is captured during enumeration, for progress totals. Mode,
/// modification time and the size written to the header are read from the
/// opened file when the entry is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path, always `/`-separated
    pub path: String,
    /// Absolute filesystem path the content is read from
    pub source: PathBuf,
    /// File size in bytes at enumeration time
    pub size: u64,
    /// Entry kind
    pub kind: EntryKind,
}

impl ArchiveEntry {
    /// Build an entry for a regular file by reading its metadata
    ///
    /// Symlinks are followed, so a tracked link contributes its target's content.
    pub fn from_file(source: &Path, path: String) -> Result<Self> {
        let metadata = fs::metadata(source)?;
        Self::from_metadata(source, path, &metadata)
    }

    /// Build an entry from metadata the caller already holds
    pub fn from_metadata(source: &Path, path: String, metadata: &fs::Metadata) -> Result<Self> {
        if !metadata.is_file() {
            return Err(ArkError::internal(format!("{:?} is not a regular file", source)));
        }
        Ok(Self {
            path,
            source: source.to_path_buf(),
            size: metadata.len(),
            kind: EntryKind::File,
        })
    }
}

/// Header of an entry read back from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Archive-relative path, always `/`-separated, no trailing slash
    pub path: String,
    /// Entry kind
    pub kind: EntryKind,
    /// Content size in bytes
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Modification time (whole seconds)
    pub modified: SystemTime,
}

/// Per-entry outcome decided by the restore reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreDecision {
    /// Existing file matches by modification time; nothing is touched
    Skip,
    /// Something exists at the target path and is replaced
    Overwrite,
    /// Nothing exists at the target path
    Create,
}

/// Archive paths seen during one restore pass
///
/// Every regular-file entry is recorded, including skipped ones. The set
/// only exists to decide which untracked files are stale after the pass.
#[derive(Debug, Default, Clone)]
pub struct ExtractedPathSet {
    paths: HashSet<String>,
}

impl ExtractedPathSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an archive path
    pub fn insert(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    /// Whether the archive contained this path
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Recorded paths in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path was recorded
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Result of an archive operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    /// Path of the written archive
    pub archive_path: PathBuf,
    /// Repository that was archived
    pub repo_path: PathBuf,
    /// Number of file entries written
    pub files_written: usize,
    /// Uncompressed content bytes written
    pub bytes_written: u64,
    /// Number of repository roots visited (top-level plus submodules)
    pub roots_visited: usize,
    /// When the archive was created
    pub created_at: DateTime<Utc>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Result of a restore operation
///
/// Contains statistics about a completed restore. A second restore of the
/// same archive into the same directory reports `files_restored == 0`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Directory that was restored into
    pub target_path: PathBuf,
    /// Number of files whose content was written
    pub files_restored: usize,
    /// Number of files skipped because they were unchanged
    pub files_skipped: usize,
    /// Number of stale untracked files removed after the pass
    pub files_deleted: usize,
    /// Total content bytes written
    pub bytes_written: u64,
    /// Time taken for restoration in milliseconds
    pub duration_ms: u64,
}

/// Configuration shared by archive and restore operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArkConfig {
    /// Name of the repository metadata entry walked unconditionally
    pub metadata_dir: String,
    /// gzip level, 0-9
    pub compression_level: u32,
    /// Program used for version-control queries
    pub git_program: String,
}

impl Default for ArkConfig {
    fn default() -> Self {
        Self {
            metadata_dir: ".git".to_string(),
            compression_level: crate::archive::DEFAULT_COMPRESSION_LEVEL,
            git_program: "git".to_string(),
        }
    }
}

impl ArkConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ArkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.metadata_dir.is_empty()
            || self.metadata_dir.contains('/')
            || self.metadata_dir.contains('\\')
            || self.metadata_dir == "."
            || self.metadata_dir == ".."
        {
            return Err(ArkError::InvalidConfiguration(format!(
                "metadata_dir must be a single path component, got {:?}",
                self.metadata_dir
            )));
        }
        if self.compression_level > 9 {
            return Err(ArkError::InvalidConfiguration(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        if self.git_program.trim().is_empty() {
            return Err(ArkError::InvalidConfiguration("git_program must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed ("add", "skip", "restore", "remove")
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}
