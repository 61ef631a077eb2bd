//! Error types for repoark
//!
//! This module defines every error that can abort an archive or restore
//! command. Errors are fatal to the command that raised them: the only retry
//! anywhere in the crate is the single permission-escalation retry performed
//! by [`crate::utils::remove_path`].
//!
//! The variants fall into five groups:
//!
//! - **Input validation**: [`ArkError::PathNotFound`], [`ArkError::NotADirectory`],
//!   [`ArkError::NotARepository`], [`ArkError::InvalidConfiguration`]
//! - **External queries**: [`ArkError::QueryFailed`]
//! - **I/O**: [`ArkError::Io`], [`ArkError::WalkDir`], [`ArkError::WriteFailed`],
//!   [`ArkError::MetadataRestoreFailed`]
//! - **Removal**: [`ArkError::RemovalFailed`]
//! - **Archive content**: [`ArkError::UnsupportedEntryKind`], [`ArkError::UnsafeEntryPath`],
//!   [`ArkError::PlainDirectoryEntry`], [`ArkError::DirectorySymlink`],
//!   [`ArkError::InvalidPathEncoding`]

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the repoark library
pub type Result<T> = std::result::Result<T, ArkError>;

/// Main error type for all repoark operations
#[derive(Debug, Error)]
pub enum ArkError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while walking the metadata directory
    #[error("error walking metadata directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input path does not exist
    #[error("error accessing path: {path:?} does not exist")]
    PathNotFound {
        /// Path that was requested
        path: PathBuf,
    },

    /// Input path exists but is not a directory
    #[error("{path:?} is not a directory")]
    NotADirectory {
        /// Path that was requested
        path: PathBuf,
    },

    /// Input path is not inside a git working tree
    #[error("{path:?} is not a valid Git repository")]
    NotARepository {
        /// Path that was requested
        path: PathBuf,
    },

    /// A version-control query could not run or exited with failure
    #[error("`{command}` failed: {message}")]
    QueryFailed {
        /// Command line that was run
        command: String,
        /// Captured stderr or spawn error
        message: String,
    },

    /// The file listing returned a directory that is not a submodule
    #[error("{path:?} is a directory but not a registered submodule; refusing to archive it partially")]
    PlainDirectoryEntry {
        /// Absolute path of the directory
        path: PathBuf,
    },

    /// The file listing returned a symlink that points at a directory
    #[error("{path:?} is a symlink to a directory; the archive stores regular files only")]
    DirectorySymlink {
        /// Absolute path of the link
        path: PathBuf,
    },

    /// A listed path is not valid UTF-8 and cannot be stored in the archive
    #[error("path is not valid UTF-8: {0}")]
    InvalidPathEncoding(String),

    /// Writing restored file content failed
    #[error("error writing {path:?}: {source}")]
    WriteFailed {
        /// Target file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Restoring mode bits or timestamps failed after content was written
    #[error("error restoring metadata of {path:?}: {source}")]
    MetadataRestoreFailed {
        /// Target file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Removal failed even after making the target writable
    #[error("error removing existing path {path:?}: {source}")]
    RemovalFailed {
        /// Path that could not be removed
        path: PathBuf,
        /// Error from the last removal attempt
        #[source]
        source: std::io::Error,
    },

    /// Archive contains an entry that is neither a regular file nor a directory
    #[error("unsupported entry kind {kind} for {path}")]
    UnsupportedEntryKind {
        /// Archive path of the entry
        path: String,
        /// Human-readable entry type
        kind: String,
    },

    /// Archive entry path is absolute, escapes the target, or is not UTF-8
    #[error("unsafe archive entry path: {0}")]
    UnsafeEntryPath(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArkError {
    /// Create a query failure for the given command line
    pub fn query(command: impl Into<String>, message: impl Into<String>) -> Self {
        ArkError::QueryFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        ArkError::Internal(msg.into())
    }

    /// Check if this error was caused by bad user input rather than the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ArkError::PathNotFound { .. }
                | ArkError::NotADirectory { .. }
                | ArkError::NotARepository { .. }
                | ArkError::InvalidConfiguration(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            ArkError::NotARepository { path } => {
                format!("{:?} is not inside a git working tree. Run the command on a repository root.", path)
            }
            ArkError::QueryFailed { command, message } => {
                format!("git query `{}` failed: {}. Check that git is installed and on PATH.", command, message.trim())
            }
            ArkError::RemovalFailed { path, source } => {
                format!(
                    "Could not remove {:?} ({}). Check ownership of the target directory.",
                    path, source
                )
            }
            ArkError::PlainDirectoryEntry { path } => {
                format!(
                    "{:?} is a nested directory git reports as a single entry (usually an untracked repository). \
                     Register it as a submodule, ignore it, or remove it before archiving.",
                    path
                )
            }
            ArkError::DirectorySymlink { path } => {
                format!(
                    "{:?} is a symlink to a directory and cannot be archived without losing it. \
                     Replace it with a file symlink or a real directory, or remove it from the index.",
                    path
                )
            }
            ArkError::InvalidPathEncoding(path) => {
                format!("{} has a name that is not valid UTF-8. Rename it before archiving.", path)
            }
            _ => self.to_string(),
        }
    }
}
