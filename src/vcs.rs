//! Version-control queries
//!
//! repoark never reads git's object model itself. Everything it needs to know
//! about a working tree comes from four questions, modeled by [`RepoQuery`]:
//!
//! | Question                      | git invocation                                       |
//! |-------------------------------|------------------------------------------------------|
//! | is this inside a work tree?   | `rev-parse --is-inside-work-tree`                    |
//! | tracked + untracked files     | `ls-files -z --cached --others --exclude-standard`   |
//! | untracked files only          | `ls-files -z --others --exclude-standard`            |
//! | is `path` a submodule?        | `ls-files -s -z -- <path>` (gitlink mode `160000`)   |
//!
//! [`GitCli`] answers them by running the git binary synchronously, one
//! process at a time. Listings are NUL-separated so that names containing
//! quotes, backslashes or newlines come through unescaped. A listed name that
//! is not valid UTF-8 is an error: it cannot be stored in an archive header
//! and dropping it would lose a file. Tests substitute a scripted
//! implementation.

use crate::error::{ArkError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};
use tracing::trace;

/// Queries the enumerator and reconciler run against a repository
pub trait RepoQuery {
    /// Whether `dir` is inside a working tree
    fn is_work_tree(&self, dir: &Path) -> Result<bool>;

    /// Tracked plus untracked-non-ignored paths, relative to `dir`
    fn list_files(&self, dir: &Path) -> Result<Vec<String>>;

    /// Untracked-non-ignored paths, relative to `dir`
    fn list_untracked(&self, dir: &Path) -> Result<Vec<String>>;

    /// Whether `relative` (below `dir`) is a registered submodule
    fn is_submodule(&self, dir: &Path, relative: &str) -> Result<bool>;
}

/// [`RepoQuery`] backed by the git command-line tool
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    /// Use `program` as the git executable
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Run `git -C dir <args>`; only spawn failures are errors
    fn run<I, S>(&self, dir: &Path, args: I) -> Result<(String, Output)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let command_line = format!(
            "{} -c core.quotepath=off -C {} {}",
            self.program,
            dir.display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        );
        trace!("Running: {}", command_line);

        let output = Command::new(&self.program)
            .arg("-c")
            .arg("core.quotepath=off")
            .arg("-C")
            .arg(dir)
            .args(&args)
            .output()
            .map_err(|e| ArkError::query(&command_line, e.to_string()))?;

        Ok((command_line, output))
    }

    /// Run a command that must succeed and return its raw stdout
    fn stdout<I, S>(&self, dir: &Path, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (command_line, output) = self.run(dir, args)?;
        if !output.status.success() {
            return Err(ArkError::query(
                command_line,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

impl RepoQuery for GitCli {
    fn is_work_tree(&self, dir: &Path) -> Result<bool> {
        let (_, output) = self.run(dir, ["rev-parse", "--is-inside-work-tree"])?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>> {
        parse_path_list(&self.stdout(dir, ["ls-files", "-z", "--others", "--exclude-standard", "--cached"])?)
    }

    fn list_untracked(&self, dir: &Path) -> Result<Vec<String>> {
        parse_path_list(&self.stdout(dir, ["ls-files", "-z", "--others", "--exclude-standard"])?)
    }

    fn is_submodule(&self, dir: &Path, relative: &str) -> Result<bool> {
        let output = self.stdout(dir, ["ls-files", "-s", "-z", "--", relative])?;
        Ok(is_gitlink_listing(&output, relative))
    }
}

/// Split NUL-delimited query output into paths, dropping empty records
///
/// # Errors
///
/// [`ArkError::InvalidPathEncoding`] if a record is not valid UTF-8.
pub fn parse_path_list(output: &[u8]) -> Result<Vec<String>> {
    output
        .split(|byte| *byte == 0)
        .filter(|record| !record.is_empty())
        .map(|record| {
            String::from_utf8(record.to_vec())
                .map_err(|_| ArkError::InvalidPathEncoding(String::from_utf8_lossy(record).into_owned()))
        })
        .collect()
}

/// Whether `ls-files -s -z` output stages `relative` as a gitlink
///
/// Records look like `<mode> <object> <stage>\t<path>`. Only mode `160000`
/// marks a submodule; a tracked symlink to a directory is `120000`.
pub fn is_gitlink_listing(output: &[u8], relative: &str) -> bool {
    output
        .split(|byte| *byte == 0)
        .filter_map(|record| {
            let tab = record.iter().position(|byte| *byte == b'\t')?;
            Some((&record[..tab], &record[tab + 1..]))
        })
        .any(|(info, path)| info.starts_with(b"160000 ") && path == relative.as_bytes())
}
