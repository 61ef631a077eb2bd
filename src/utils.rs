//! Utility functions for repoark
//!
//! This module holds the filesystem helpers shared by the enumerator and the
//! restore reconciler.
//!
//! ## Categories of Utilities
//!
//! ### Path Safety
//! - [`remove_path`]: recursive removal with a single permission-escalation retry
//! - Permission handling (cross-platform)
//!
//! ### Archive Paths
//! - Converting filesystem paths to `/`-separated archive paths and back
//! - Rejecting entry paths that would escape the restore target
//!
//! ### Timestamps
//! - [`round_to_second`]: the one-second comparison used to skip unchanged files
//!
//! ## Why removal retries
//!
//! Git stores loose objects and pack files read-only (mode 0444). On platforms
//! where a read-only file cannot be deleted, or when a read-only directory
//! blocks deletion of its children, a plain recursive delete fails. The guard
//! makes the subtree (and its parent) writable and tries exactly once more.

use crate::error::{ArkError, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Remove a file, symlink or directory tree
///
/// Does nothing if the path does not exist. Symlinks are removed, never
/// followed. If the first attempt fails with a permission error, every entry
/// under `path` is made writable and removal is retried once.
///
/// # Errors
///
/// - [`ArkError::RemovalFailed`] if the path still cannot be removed
///
/// # Example
///
/// ```rust,no_run
/// use repoark::utils::remove_path;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// remove_path(Path::new("checkout/.git/objects/ab"))?;
/// # Ok(())
/// # }
/// ```
pub fn remove_path(path: &Path) -> Result<()> {
    match try_remove(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Permission denied removing {:?}, retrying after making it writable", path);
            make_writable(path);
            try_remove(path).map_err(|source| ArkError::RemovalFailed {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(ArkError::RemovalFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn try_remove(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Best-effort: grant write access to everything under `path`
///
/// The parent directory gets owner write access too, since on Unix it is the
/// parent's mode that decides whether an entry can be unlinked.
fn make_writable(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(metadata) = fs::metadata(parent) {
            if let Err(e) = set_permissions(parent, get_permissions(&metadata) | 0o700) {
                trace!("Could not make {:?} writable: {}", parent, e);
            }
        }
    }

    for entry in WalkDir::new(path).follow_links(false).into_iter().filter_map(|e| e.ok()) {
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }
        let mode = if file_type.is_dir() { 0o777 } else { 0o666 };
        if let Err(e) = set_permissions(entry.path(), mode) {
            trace!("Could not make {:?} writable: {}", entry.path(), e);
        }
    }
}

/// Get Unix permissions from metadata
#[cfg(unix)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Get permissions from metadata (Windows implementation)
#[cfg(windows)]
pub fn get_permissions(metadata: &fs::Metadata) -> u32 {
    // Read-only maps to 0o444, everything else to 0o644
    let mut mode = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    if metadata.is_dir() {
        mode |= 0o111;
    }
    mode
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Set permissions (Windows implementation)
///
/// Only the owner write bit is meaningful: it toggles the read-only attribute.
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly((mode & 0o200) == 0);
    fs::set_permissions(path, perms)
}

/// Round a timestamp to whole Unix seconds, halves rounding up
///
/// Archive headers carry whole seconds while filesystems keep sub-second
/// precision. Both sides of the skip comparison go through this function.
pub fn round_to_second(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64 + i64::from(after.subsec_nanos() >= 500_000_000),
        Err(before) => {
            let before = before.duration();
            -(before.as_secs() as i64) - i64::from(before.subsec_nanos() > 500_000_000)
        }
    }
}

/// Convert whole Unix seconds to a `SystemTime`
pub fn system_time_from_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Convert a relative filesystem path to a `/`-separated archive path
pub fn to_archive_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Join an archive prefix and a `/`-separated relative path
///
/// ```rust
/// use repoark::utils::join_archive_path;
///
/// assert_eq!(join_archive_path("", "src/lib.rs"), "src/lib.rs");
/// assert_eq!(join_archive_path("vendor/dep", "README.md"), "vendor/dep/README.md");
/// ```
pub fn join_archive_path(prefix: &str, relative: &str) -> String {
    let relative = relative.trim_matches('/');
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Resolve a `/`-separated archive path below `root`
pub fn archive_path_to_fs(root: &Path, archive_path: &str) -> PathBuf {
    archive_path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Normalize an archive entry path and reject ones that escape the target
///
/// Leading `./` and trailing `/` are stripped. Absolute paths, `..`
/// components, backslashes and empty paths are rejected.
pub fn sanitize_entry_path(raw: &str) -> Result<String> {
    if raw.starts_with('/') || raw.contains('\\') || raw.contains('\0') {
        return Err(ArkError::UnsafeEntryPath(raw.to_string()));
    }

    let mut parts = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(ArkError::UnsafeEntryPath(raw.to_string())),
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(ArkError::UnsafeEntryPath(raw.to_string()));
    }
    Ok(parts.join("/"))
}

/// Format bytes in human-readable form
///
/// ```rust
/// use repoark::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
