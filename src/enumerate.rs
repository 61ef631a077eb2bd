//! Repository file-set enumeration
//!
//! [`RepoEnumerator`] decides exactly which files belong in an archive. The
//! file set of one repository is the union of:
//!
//! 1. tracked files,
//! 2. untracked files not excluded by ignore rules,
//! 3. every file under the metadata directory (`.git`), walked without any
//!    ignore filtering so the restored repository keeps working,
//!
//! repeated for every submodule with the submodule's path as prefix.
//!
//! ## Traversal
//!
//! Roots are processed from a FIFO work-queue: the top-level repository
//! first, then submodules in the order they were discovered, then their
//! submodules. Deep nesting therefore never grows the call stack.
//!
//! ```text
//! queue: [""]            -> lists ".", finds libs/a, libs/b
//! queue: ["libs/a", "libs/b"]
//! queue: ["libs/b", "libs/a/vendor/c"]
//! ...
//! ```
//!
//! Within one root, entries follow query order and then the metadata walk in
//! file-name order, so the same tree always yields the same entry sequence.

use crate::error::{ArkError, Result};
use crate::types::{ArchiveEntry, RootDir};
use crate::utils;
use crate::vcs::RepoQuery;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, trace, warn};
use walkdir::WalkDir;

/// Outcome of enumerating a repository
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Entries in archive order
    pub entries: Vec<ArchiveEntry>,
    /// Number of repository roots visited (top-level plus submodules)
    pub roots_visited: usize,
}

impl Enumeration {
    /// Sum of entry sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Walks a repository and its submodules to build the archive file set
#[derive(Debug)]
pub struct RepoEnumerator<'a, Q: RepoQuery + ?Sized> {
    query: &'a Q,
    metadata_dir: String,
}

impl<'a, Q: RepoQuery + ?Sized> RepoEnumerator<'a, Q> {
    /// Create an enumerator using `.git` as the metadata directory
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

    /// Check that `repo_root` is an existing repository root
    ///
    /// # Errors
    ///
    /// - [`ArkError::PathNotFound`] if nothing exists at `repo_root`
    /// - [`ArkError::NotADirectory`] if it is not a directory
    /// - [`ArkError::NotARepository`] if it is not inside a working tree, or
    ///   has no metadata entry of its own (a subdirectory of a repository)
    pub fn validate(&self, repo_root: &Path) -> Result<()> {
        let metadata = fs::metadata(repo_root).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ArkError::PathNotFound {
                path: repo_root.to_path_buf(),
            },
            _ => ArkError::Io(e),
        })?;

        if !metadata.is_dir() {
            return Err(ArkError::NotADirectory {
                path: repo_root.to_path_buf(),
            });
        }

        if !self.query.is_work_tree(repo_root)?
            || fs::symlink_metadata(repo_root.join(&self.metadata_dir)).is_err()
        {
            return Err(ArkError::NotARepository {
                path: repo_root.to_path_buf(),
            });
        }

        Ok(())
    }

    /// Enumerate the archive entries of `repo_root`
    ///
    /// Any query failure aborts enumeration; no partial result is returned.
    pub fn enumerate(&self, repo_root: &Path) -> Result<Vec<ArchiveEntry>> {
        Ok(self.enumerate_roots(repo_root)?.entries)
    }

    /// Enumerate and also report how many roots were visited
    #[instrument(skip(self))]
    pub fn enumerate_roots(&self, repo_root: &Path) -> Result<Enumeration> {
        self.validate(repo_root)?;
        let repo_root = std::path::absolute(repo_root)?;

        let mut queue = VecDeque::from([RootDir::top_level(repo_root)]);
        let mut seen = HashSet::new();
        let mut result = Enumeration::default();

        while let Some(root) = queue.pop_front() {
            if !root.prefix.is_empty() && fs::symlink_metadata(root.dir.join(&self.metadata_dir)).is_err() {
                warn!("Skipping uninitialized submodule {}", root.prefix);
                continue;
            }

            debug!("Enumerating root {:?} (prefix {:?})", root.dir, root.prefix);
            result.roots_visited += 1;
            self.enumerate_root(&root, &mut queue, &mut seen, &mut result.entries)?;
        }

        info!(
            "Enumerated {} files across {} roots",
            result.entries.len(),
            result.roots_visited
        );
        Ok(result)
    }

    fn enumerate_root(
        &self,
        root: &RootDir,
        queue: &mut VecDeque<RootDir>,
        seen: &mut HashSet<String>,
        entries: &mut Vec<ArchiveEntry>,
    ) -> Result<()> {
        for relative in self.query.list_files(&root.dir)? {
            let full_path = utils::archive_path_to_fs(&root.dir, &relative);
            let archive_path = utils::join_archive_path(&root.prefix, &relative);

            // Best-effort against a live tree: vanished paths are skipped
            let metadata = match fs::symlink_metadata(&full_path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    trace!("Skipping {:?}: {}", full_path, e);
                    continue;
                }
            };

            // File links contribute their target; directory links are never submodules
            let metadata = if metadata.file_type().is_symlink() {
                match fs::metadata(&full_path) {
                    Ok(target) if target.is_dir() => {
                        return Err(ArkError::DirectorySymlink { path: full_path });
                    }
                    Ok(target) => target,
                    Err(e) => {
                        warn!("Skipping dangling symlink {}: {}", archive_path, e);
                        continue;
                    }
                }
            } else {
                metadata
            };

            if metadata.is_dir() {
                if self.query.is_submodule(&root.dir, relative.trim_end_matches('/'))? {
                    debug!("Found submodule {}", archive_path);
                    queue.push_back(RootDir {
                        prefix: archive_path,
                        dir: full_path,
                    });
                    continue;
                }
                return Err(ArkError::PlainDirectoryEntry { path: full_path });
            }

            push_entry(&full_path, archive_path, &metadata, seen, entries)?;
        }

        self.walk_metadata(root, seen, entries)
    }

    /// Capture the metadata entry verbatim, ignore rules do not apply here
    fn walk_metadata(
        &self,
        root: &RootDir,
        seen: &mut HashSet<String>,
        entries: &mut Vec<ArchiveEntry>,
    ) -> Result<()> {
        let metadata_root = root.dir.join(&self.metadata_dir);

        for entry in WalkDir::new(&metadata_root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }

            let relative = entry.path().strip_prefix(&root.dir).map_err(|_| {
                ArkError::internal(format!("{:?} is not below {:?}", entry.path(), root.dir))
            })?;
            let archive_path = utils::join_archive_path(&root.prefix, &utils::to_archive_path(relative));

            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    trace!("Skipping {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            push_entry(entry.path(), archive_path, &metadata, seen, entries)?;
        }

        Ok(())
    }
}

fn push_entry(
    source: &Path,
    archive_path: String,
    metadata: &fs::Metadata,
    seen: &mut HashSet<String>,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<()> {
    if !metadata.is_file() {
        warn!("Skipping {} (not a regular file)", archive_path);
        return Ok(());
    }
    if !seen.insert(archive_path.clone()) {
        warn!("Skipping duplicate path {}", archive_path);
        return Ok(());
    }

    trace!("Selected {}", archive_path);
    entries.push(ArchiveEntry::from_metadata(source, archive_path, metadata)?);
    Ok(())
}
