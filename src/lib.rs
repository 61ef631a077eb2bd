//! # repoark - Whole-repository archives that restore differentially
//!
//! Packs a git working tree into a single gzip-compressed tar file and
//! unpacks it again without rewriting files that have not changed.
//!
//! ## Overview
//!
//! An archive captures everything needed to reproduce a working repository:
//! - Tracked files
//! - Untracked files that are not ignored
//! - The complete `.git` metadata directory, ignore rules notwithstanding
//! - All of the above for every submodule, recursively
//!
//! Restoring compares each entry's modification time against the file on
//! disk. Matching files are skipped; everything else is rewritten with its
//! archived mode and modification time. Untracked files that the archive does
//! not contain are deleted afterwards, so the target converges on the
//! archived state while tracked and ignored files stay untouched.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use repoark::RepoArkBuilder;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ark = RepoArkBuilder::new().build()?;
//!
//! // Pack the repository
//! let summary = ark.archive(Path::new("./my_project"), Path::new("my_project.tar.gz"))?;
//! println!("Archived {} files", summary.files_written);
//!
//! // Later, bring another checkout up to date
//! let result = ark.restore(Path::new("./other_checkout"), Path::new("my_project.tar.gz"))?;
//! println!("Restored {} files, {} unchanged", result.files_restored, result.files_skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ## Archive Format
//!
//! A plain `.tar.gz` readable by any tar implementation. Entries are regular
//! files only, with `/`-separated relative paths, permission bits, size and a
//! modification time in whole seconds. Submodule contents appear under the
//! submodule's path, exactly as in the working tree.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ArkError>`. Any failure aborts the
//! operation: enumeration never produces a partial file list, and a restore
//! stops at the first entry it cannot write.
//!
//! ## Module Organization
//!
//! - [`enumerate`]: Deciding which files go into an archive
//! - [`archive`]: tar + gzip writer and reader
//! - [`restore`]: Differential restore and stale-file removal
//! - [`vcs`]: Queries against git
//! - [`naming`]: Default archive file names
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling
//! - [`utils`]: Path, permission and timestamp helpers

pub mod archive;
pub mod enumerate;
pub mod error;
pub mod naming;
pub mod repoark;
pub mod restore;
pub mod types;
pub mod utils;
pub mod vcs;

// Re-export main types for convenience
pub use archive::{ArchiveReader, ArchiveWriter};
pub use enumerate::{Enumeration, RepoEnumerator};
pub use error::{ArkError, Result};
pub use naming::find_available_archive_name;
pub use repoark::{RepoArk, RepoArkBuilder};
pub use restore::RestoreReconciler;
pub use types::*;
pub use vcs::{GitCli, RepoQuery};
