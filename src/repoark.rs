//! Main repoark implementation
//!
//! [`RepoArk`] ties the pieces together:
//!
//! - **archive**: [`RepoEnumerator`] builds the complete entry list, then
//!   [`ArchiveWriter`] streams it into a gzip-compressed tar file
//! - **restore**: [`RestoreReconciler`] applies an archive differentially
//!
//! Enumeration finishes before the output file is created, so a failing git
//! query never leaves an archive behind. A failure while writing leaves the
//! partial file in place for inspection.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use repoark::RepoArkBuilder;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ark = RepoArkBuilder::new().compression_level(9).build()?;
//!
//! let summary = ark.archive(Path::new("./project"), Path::new("project.tar.gz"))?;
//! println!("{} files from {} repositories", summary.files_written, summary.roots_visited);
//!
//! let result = ark.restore(Path::new("./checkout"), Path::new("project.tar.gz"))?;
//! println!("{} restored, {} unchanged", result.files_restored, result.files_skipped);
//! # Ok(())
//! # }
//! ```

use crate::archive::ArchiveWriter;
use crate::enumerate::RepoEnumerator;
use crate::error::Result;
use crate::restore::RestoreReconciler;
use crate::types::{ArchiveSummary, ArkConfig, ProgressInfo, RestoreResult};
use crate::utils;
use crate::vcs::{GitCli, RepoQuery};
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

/// Archives and restores git working trees
///
/// Generic over the [`RepoQuery`] used to talk to git; the default is the
/// git command-line tool.
#[derive(Debug)]
pub struct RepoArk<Q: RepoQuery = GitCli> {
    config: ArkConfig,
    query: Q,
}

impl<Q: RepoQuery> RepoArk<Q> {
    /// Active configuration
    pub fn config(&self) -> &ArkConfig {
        &self.config
    }

    /// Archive `repo_path` and its submodules into `output`
    ///
    /// # Errors
    ///
    /// - [`ArkError::PathNotFound`](crate::ArkError::PathNotFound),
    ///   [`ArkError::NotADirectory`](crate::ArkError::NotADirectory) or
    ///   [`ArkError::NotARepository`](crate::ArkError::NotARepository) for a bad repository path
    /// - [`ArkError::QueryFailed`](crate::ArkError::QueryFailed) if any git query fails
    /// - [`ArkError::Io`](crate::ArkError::Io) if a file cannot be read or the archive cannot be written
    pub fn archive(&self, repo_path: &Path, output: &Path) -> Result<ArchiveSummary> {
        self.archive_with_progress::<fn(ProgressInfo)>(repo_path, output, None)
    }

    /// Archive with a per-file progress callback
    #[instrument(skip(self, progress_callback))]
    pub fn archive_with_progress<F>(
        &self,
        repo_path: &Path,
        output: &Path,
        progress_callback: Option<F>,
    ) -> Result<ArchiveSummary>
    where
        F: Fn(ProgressInfo),
    {
        let start = Instant::now();
        let enumeration = RepoEnumerator::new(&self.query)
            .with_metadata_dir(self.config.metadata_dir.clone())
            .enumerate_roots(repo_path)?;

        info!(
            "Writing {} files ({}) to {:?}",
            enumeration.entries.len(),
            utils::format_bytes(enumeration.total_size()),
            output
        );

        let mut writer = ArchiveWriter::create(output, self.config.compression_level)?;
        let (files_written, bytes_written) = writer.write_all(&enumeration.entries, progress_callback)?;
        writer.finish()?;

        let summary = ArchiveSummary {
            archive_path: output.to_path_buf(),
            repo_path: repo_path.to_path_buf(),
            files_written,
            bytes_written,
            roots_visited: enumeration.roots_visited,
            created_at: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Archived {:?} in {}ms: {} files, {}",
            repo_path,
            summary.duration_ms,
            summary.files_written,
            utils::format_bytes(summary.bytes_written)
        );
        Ok(summary)
    }

    /// Restore `archive_path` into `repo_path`
    ///
    /// Files whose modification time already matches are left alone, and
    /// untracked files that the archive does not contain are deleted.
    pub fn restore(&self, repo_path: &Path, archive_path: &Path) -> Result<RestoreResult> {
        self.restore_with_progress::<fn(ProgressInfo)>(repo_path, archive_path, None)
    }

    /// Restore with a per-file progress callback
    pub fn restore_with_progress<F>(
        &self,
        repo_path: &Path,
        archive_path: &Path,
        progress_callback: Option<F>,
    ) -> Result<RestoreResult>
    where
        F: Fn(ProgressInfo),
    {
        RestoreReconciler::new(&self.query)
            .with_metadata_dir(self.config.metadata_dir.clone())
            .restore_with_progress(archive_path, repo_path, progress_callback)
    }
}

/// Builder for configuring [`RepoArk`] instances
///
/// # Default Values
///
/// - `metadata_dir`: `.git`
/// - `compression_level`: 6
/// - `git_program`: `git`
#[derive(Debug, Clone, Default)]
pub struct RepoArkBuilder {
    config: ArkConfig,
}

impl RepoArkBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration, e.g. one loaded from a file
    pub fn config(mut self, config: ArkConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the metadata directory captured without ignore filtering
    pub fn metadata_dir(mut self, name: impl Into<String>) -> Self {
        self.config.metadata_dir = name.into();
        self
    }

    /// gzip compression level, 0 (store) to 9 (smallest)
    ///
    /// ```rust
    /// use repoark::RepoArkBuilder;
    ///
    /// let builder = RepoArkBuilder::new().compression_level(1);
    /// ```
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    /// git executable used for queries
    pub fn git_program(mut self, program: impl Into<String>) -> Self {
        self.config.git_program = program.into();
        self
    }

    /// Build an instance that queries git through its command-line tool
    ///
    /// # Errors
    ///
    /// - [`ArkError::InvalidConfiguration`](crate::ArkError::InvalidConfiguration) if a setting is out of range
    pub fn build(self) -> Result<RepoArk<GitCli>> {
        let query = GitCli::new(self.config.git_program.clone());
        self.build_with_query(query)
    }

    /// Build an instance around a custom [`RepoQuery`]
    pub fn build_with_query<Q: RepoQuery>(self, query: Q) -> Result<RepoArk<Q>> {
        self.config.validate()?;
        Ok(RepoArk {
            config: self.config,
            query,
        })
    }
}
