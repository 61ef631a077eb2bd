//! Default archive file names
//!
//! When no output file is given, the archive is named after the repository
//! directory: `<name>.tar.gz`, or `<name>-N.tar.gz` for the first free `N`
//! if that name is already taken in the output directory.

use crate::error::{ArkError, Result};
use std::path::{Path, PathBuf};

/// Suffix appended to generated archive names
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Pick the first unused archive path for `repo_path` inside `dir`
///
/// `dir` is usually the current working directory; it is passed in rather
/// than looked up so callers and tests control where the archive lands.
///
/// # Errors
///
/// - [`ArkError::Io`] if `repo_path` has no final component and cannot be canonicalized
pub fn find_available_archive_name(repo_path: &Path, dir: &Path) -> Result<PathBuf> {
    let base_name = repo_base_name(repo_path)?;

    let candidate = dir.join(format!("{}.{}", base_name, ARCHIVE_EXTENSION));
    if !candidate.exists() {
        return Ok(candidate);
    }

    (1u64..)
        .map(|i| dir.join(format!("{}-{}.{}", base_name, i, ARCHIVE_EXTENSION)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| ArkError::internal("no free archive name"))
}

/// Last component of the repository path, resolving `.` and `..`
fn repo_base_name(repo_path: &Path) -> Result<String> {
    if let Some(name) = repo_path.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }

    let canonical = repo_path.canonicalize()?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ArkError::InvalidConfiguration(format!("cannot derive an archive name from {:?}", repo_path)))
}
