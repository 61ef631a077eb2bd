//! Differential restore
//!
//! [`RestoreReconciler`] applies an archive to a target directory while
//! touching as little as possible:
//!
//! - a file whose modification time (rounded to the second) already matches
//!   the archive header is **skipped**: no write, no chmod, no utime;
//! - anything else at the target path is removed through
//!   [`utils::remove_path`] and **overwritten**;
//! - missing files are **created** together with their parent directories.
//!
//! Written files get their mode bits and then their modification time
//! restored in separate steps, so a failure in either is reported as
//! [`ArkError::MetadataRestoreFailed`] rather than as a content write error.
//!
//! Archives hold regular files only, so empty directories git needs inside a
//! metadata directory (`objects`, `refs`) are lost for a repository without
//! commits or with packed refs. They are recreated for every restored git
//! directory before the stale-file query runs against the target.
//!
//! After the pass, untracked-non-ignored files in the target that were not in
//! the archive are deleted. Tracked and ignored files are never candidates.
//!
//! The comparison is a heuristic on modification time, not a content hash.
//! Restoring the same archive twice writes nothing the second time.

use crate::archive::ArchiveReader;
use crate::error::{ArkError, Result};
use crate::types::{EntryHeader, EntryKind, ExtractedPathSet, ProgressInfo, RestoreDecision, RestoreResult};
use crate::utils;
use crate::vcs::RepoQuery;
use filetime::FileTime;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, trace};

/// Reconciles archive contents against an existing working tree
#[derive(Debug)]
pub struct RestoreReconciler<'a, Q: RepoQuery + ?Sized> {
    query: &'a Q,
    metadata_dir: String,
}

/// Empty directories git requires before it recognizes a metadata directory
const METADATA_SKELETON: [&str; 3] = ["objects", "refs/heads", "refs/tags"];

impl<'a, Q: RepoQuery + ?Sized> RestoreReconciler<'a, Q> {
    /// Create a reconciler that uses `query` for the stale-file pass
    pub fn new(query: &'a Q) -> Self {
        Self {
            query,
            metadata_dir: ".git".to_string(),
        }
    }

    /// Use a different metadata directory name
    pub fn with_metadata_dir(mut self, name: impl Into<String>) -> Self {
        self.metadata_dir = name.into();
        self
    }

    /// Restore `archive_path` into `target_dir`
    pub fn restore(&self, archive_path: &Path, target_dir: &Path) -> Result<RestoreResult> {
        self.restore_with_progress::<fn(ProgressInfo)>(archive_path, target_dir, None)
    }

    /// Restore with a per-file progress callback
    ///
    /// # Errors
    ///
    /// Every failure aborts the restore and leaves the target as-is:
    /// - [`ArkError::Io`] if the archive cannot be opened or decoded
    /// - [`ArkError::UnsupportedEntryKind`] / [`ArkError::UnsafeEntryPath`] for bad entries
    /// - [`ArkError::WriteFailed`] / [`ArkError::MetadataRestoreFailed`] while extracting
    /// - [`ArkError::RemovalFailed`] if an existing path cannot be cleared
    /// - [`ArkError::QueryFailed`] if the untracked-file query fails
    #[instrument(skip(self, progress_callback))]
    pub fn restore_with_progress<F>(
        &self,
        archive_path: &Path,
        target_dir: &Path,
        progress_callback: Option<F>,
    ) -> Result<RestoreResult>
    where
        F: Fn(ProgressInfo),
    {
        info!("Restoring {:?} into {:?}", archive_path, target_dir);
        let start = Instant::now();

        let mut reader = ArchiveReader::open(archive_path)?;
        fs::create_dir_all(target_dir)?;

        let mut extracted = ExtractedPathSet::new();
        let mut result = RestoreResult {
            target_path: target_dir.to_path_buf(),
            ..Default::default()
        };
        let mut processed = 0usize;

        reader.for_each_entry(|header, content| {
            if header.kind == EntryKind::Directory {
                trace!("Ignoring directory entry {}", header.path);
                return Ok(());
            }

            extracted.insert(header.path.clone());
            let target = utils::archive_path_to_fs(target_dir, &header.path);

            clear_blocking_ancestors(target_dir, &target)?;
            let decision = decide(&target, &header);
            let operation = match decision {
                RestoreDecision::Skip => {
                    debug!("skip {}", header.path);
                    result.files_skipped += 1;
                    "skip"
                }
                RestoreDecision::Overwrite | RestoreDecision::Create => {
                    if decision == RestoreDecision::Overwrite {
                        utils::remove_path(&target)?;
                    }
                    debug!("restore {}", header.path);
                    result.bytes_written += extract_file(&target, &header, content)?;
                    result.files_restored += 1;
                    "restore"
                }
            };

            processed += 1;
            if let Some(ref callback) = progress_callback {
                callback(ProgressInfo {
                    operation: operation.to_string(),
                    current_item: Some(header.path),
                    processed,
                    total: None,
                    bytes_processed: result.bytes_written,
                });
            }
            Ok(())
        })?;

        self.recreate_metadata_skeleton(target_dir, &extracted)?;
        result.files_deleted = self.remove_stale(target_dir, &extracted, progress_callback.as_ref())?;
        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Restored {:?} in {}ms ({} written, {} skipped, {} removed)",
            target_dir, result.duration_ms, result.files_restored, result.files_skipped, result.files_deleted
        );
        Ok(result)
    }

    /// Restored git directories: `HEAD` and `config` below a metadata directory
    fn git_dirs<'s>(&self, extracted: &'s ExtractedPathSet) -> BTreeSet<&'s str> {
        extracted
            .iter()
            .filter_map(|path| {
                let (dir, name) = path.rsplit_once('/')?;
                (name == "HEAD").then_some(dir)
            })
            .filter(|dir| dir.split('/').any(|part| part == self.metadata_dir))
            .filter(|dir| extracted.contains(&format!("{}/config", dir)))
            .collect()
    }

    /// Create the directories an archive of regular files cannot carry
    fn recreate_metadata_skeleton(&self, target_dir: &Path, extracted: &ExtractedPathSet) -> Result<()> {
        for git_dir in self.git_dirs(extracted) {
            for required in METADATA_SKELETON {
                let path = utils::archive_path_to_fs(target_dir, &format!("{}/{}", git_dir, required));
                if fs::symlink_metadata(&path).is_err() {
                    debug!("Recreating {}/{}", git_dir, required);
                    fs::create_dir_all(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Delete untracked-non-ignored files the archive did not contain
    fn remove_stale<F>(
        &self,
        target_dir: &Path,
        extracted: &ExtractedPathSet,
        progress_callback: Option<&F>,
    ) -> Result<usize>
    where
        F: Fn(ProgressInfo),
    {
        let mut removed = 0;
        for relative in self.query.list_untracked(target_dir)? {
            let relative = relative.trim_end_matches('/');
            if extracted.contains(relative) {
                continue;
            }

            debug!("remove {}", relative);
            utils::remove_path(&utils::archive_path_to_fs(target_dir, relative))?;
            removed += 1;

            if let Some(callback) = progress_callback {
                callback(ProgressInfo {
                    operation: "remove".to_string(),
                    current_item: Some(relative.to_string()),
                    processed: removed,
                    total: None,
                    bytes_processed: 0,
                });
            }
        }
        Ok(removed)
    }
}

/// Decide what to do with one archive entry
///
/// Only an existing regular file whose modification time equals the
/// header's at one-second resolution is skipped. Symlinks are not followed:
/// a link at the target path is always replaced by a regular file.
pub fn decide(target: &Path, header: &EntryHeader) -> RestoreDecision {
    let Ok(metadata) = fs::symlink_metadata(target) else {
        return RestoreDecision::Create;
    };

    let unchanged = metadata.is_file()
        && metadata
            .modified()
            .map(|modified| utils::round_to_second(modified) == utils::round_to_second(header.modified))
            .unwrap_or(false);

    if unchanged {
        RestoreDecision::Skip
    } else {
        RestoreDecision::Overwrite
    }
}

/// Write one entry, then restore its mode and modification time
fn extract_file(target: &Path, header: &EntryHeader, content: &mut dyn Read) -> Result<u64> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let write_failed = |source: io::Error| ArkError::WriteFailed {
        path: target.to_path_buf(),
        source,
    };
    let mut file = open_for_write(target, header.mode).map_err(write_failed)?;
    let written = io::copy(content, &mut file).map_err(write_failed)?;
    drop(file);

    let metadata_failed = |source: io::Error| ArkError::MetadataRestoreFailed {
        path: target.to_path_buf(),
        source,
    };
    utils::set_permissions(target, header.mode).map_err(metadata_failed)?;
    let mtime = FileTime::from_system_time(header.modified);
    filetime::set_file_times(target, mtime, mtime).map_err(metadata_failed)?;

    Ok(written)
}

#[cfg(unix)]
fn open_for_write(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new().write(true).create(true).truncate(true).mode(mode).open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

/// Remove the first non-directory standing where a parent directory must go
///
/// A symlink counts as a non-directory even when it points at one, so
/// writes never leave `target_dir` through a link.
fn clear_blocking_ancestors(target_dir: &Path, target: &Path) -> Result<()> {
    let Some(relative) = target.parent().and_then(|p| p.strip_prefix(target_dir).ok()) else {
        return Ok(());
    };

    let mut current = target_dir.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.is_dir() => continue,
            Ok(_) => {
                debug!("Removing {:?} to make room for a directory", current);
                utils::remove_path(&current)?;
            }
            Err(_) => {}
        }
        break;
    }
    Ok(())
}
