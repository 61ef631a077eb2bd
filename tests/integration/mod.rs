//! End-to-end tests against real git repositories
//!
//! Every test builds its repositories with the git binary on PATH and is
//! skipped (with a note on stderr) when git is not available.

use ::repoark::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Whether a usable git binary is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir` with a fixed identity, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=repoark tests",
            "-c",
            "user.email=tests@repoark.invalid",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "protocol.file.allow=always",
        ])
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A scratch repository with helpers for common setup steps
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    pub fn init() -> Self {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn commit_all(&self, message: &str) {
        git(self.path(), &["add", "-A"]);
        git(self.path(), &["commit", "-q", "-m", message]);
    }

    pub fn head(&self) -> String {
        git(self.path(), &["rev-parse", "HEAD"])
    }
}

/// Skip the current test when git is missing
macro_rules! require_git {
    () => {
        if !git_available() {
            eprintln!("git not available, skipping");
            return;
        }
    };
}

/// A committed repository with one untracked and one ignored file
fn sample_repo() -> TestRepo {
    let repo = TestRepo::init();
    repo.write("README.md", "# sample\n");
    repo.write("src/main.rs", "fn main() {}\n");
    // ignore rules that would also match metadata files if they applied there
    repo.write(".gitignore", "*.log\nconfig\nHEAD\n");
    repo.commit_all("initial");

    repo.write("notes.txt", "untracked but not ignored\n");
    repo.write("debug.log", "ignored\n");
    repo
}

fn archive_paths(archive: &Path) -> Vec<String> {
    ArchiveReader::open(archive)
        .unwrap()
        .headers()
        .unwrap()
        .into_iter()
        .map(|h| h.path)
        .collect()
}

#[test]
fn test_archive_selects_tracked_untracked_and_metadata() {
    require_git!();
    let repo = sample_repo();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("sample.tar.gz");

    let ark = RepoArkBuilder::new().build().unwrap();
    let summary = ark.archive(repo.path(), &archive).unwrap();
    assert_eq!(summary.roots_visited, 1);

    let paths = archive_paths(&archive);
    assert!(paths.contains(&"README.md".to_string()));
    assert!(paths.contains(&"src/main.rs".to_string()));
    assert!(paths.contains(&".gitignore".to_string()));
    assert!(paths.contains(&"notes.txt".to_string()));
    assert!(!paths.contains(&"debug.log".to_string()));

    // metadata is captured in full despite the ignore rules
    assert!(paths.contains(&".git/HEAD".to_string()));
    assert!(paths.contains(&".git/config".to_string()));
    assert!(paths.iter().any(|p| p.starts_with(".git/objects/")));
    assert_eq!(summary.files_written, paths.len());
}

#[test]
fn test_round_trip_into_empty_directory() {
    require_git!();
    let repo = sample_repo();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("sample.tar.gz");

    let ark = RepoArkBuilder::new().build().unwrap();
    ark.archive(repo.path(), &archive).unwrap();

    let target = out.path().join("restored");
    let result = ark.restore(&target, &archive).unwrap();
    assert!(result.files_restored > 0);
    assert_eq!(result.files_deleted, 0);

    assert_eq!(git(&target, &["rev-parse", "HEAD"]), repo.head());
    assert_eq!(fs::read_to_string(target.join("notes.txt")).unwrap(), "untracked but not ignored\n");
    assert!(!target.join("debug.log").exists());
    assert_eq!(git(&target, &["status", "--porcelain", "--untracked-files=no"]), "");
}

#[test]
fn test_second_restore_is_a_no_op() {
    require_git!();
    let repo = sample_repo();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("sample.tar.gz");

    let ark = RepoArkBuilder::new().build().unwrap();
    ark.archive(repo.path(), &archive).unwrap();

    let target = out.path().join("restored");
    let first = ark.restore(&target, &archive).unwrap();
    let second = ark.restore(&target, &archive).unwrap();

    assert_eq!(second.files_restored, 0);
    assert_eq!(second.bytes_written, 0);
    assert_eq!(second.files_skipped, first.files_restored + first.files_skipped);
    assert_eq!(second.files_deleted, 0);
}

#[test]
fn test_restore_reconciles_existing_checkout() {
    require_git!();
    let repo = sample_repo();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("sample.tar.gz");

    let ark = RepoArkBuilder::new().build().unwrap();
    ark.archive(repo.path(), &archive).unwrap();

    let target = out.path().join("restored");
    ark.restore(&target, &archive).unwrap();

    // drift: edit a tracked file, add a stray untracked file and an ignored one
    fs::write(target.join("README.md"), "# local edit\n").unwrap();
    filetime::set_file_mtime(&target.join("README.md"), filetime::FileTime::from_unix_time(1, 0)).unwrap();
    fs::write(target.join("stray.txt"), "not in the archive\n").unwrap();
    fs::write(target.join("local.log"), "ignored output\n").unwrap();

    let result = ark.restore(&target, &archive).unwrap();
    assert_eq!(result.files_restored, 1);
    assert_eq!(result.files_deleted, 1);

    assert_eq!(fs::read_to_string(target.join("README.md")).unwrap(), "# sample\n");
    assert!(!target.join("stray.txt").exists());
    assert!(target.join("local.log").exists());
    assert!(target.join("notes.txt").exists());
}

#[test]
fn test_submodules_keep_their_paths() {
    require_git!();
    let library = TestRepo::init();
    library.write("lib.rs", "pub fn lib() {}\n");
    library.commit_all("library");

    let repo = TestRepo::init();
    repo.write("README.md", "# with submodule\n");
    repo.commit_all("initial");
    let url = library.path().to_string_lossy().into_owned();
    git(repo.path(), &["submodule", "add", "-q", &url, "libs/lib"]);
    repo.commit_all("add submodule");

    let out = TempDir::new().unwrap();
    let archive = out.path().join("with-sub.tar.gz");
    let ark = RepoArkBuilder::new().build().unwrap();
    let summary = ark.archive(repo.path(), &archive).unwrap();
    assert_eq!(summary.roots_visited, 2);

    let paths = archive_paths(&archive);
    assert!(paths.contains(&"libs/lib/lib.rs".to_string()));
    assert!(paths.contains(&"libs/lib/.git".to_string()));
    assert!(paths.contains(&".gitmodules".to_string()));
    assert!(paths.iter().any(|p| p.starts_with(".git/modules/libs/lib/")));
    assert!(!paths.iter().any(|p| p.starts_with("libs/lib/libs/lib")));

    let target = out.path().join("restored");
    ark.restore(&target, &archive).unwrap();
    assert_eq!(fs::read_to_string(target.join("libs/lib/lib.rs")).unwrap(), "pub fn lib() {}\n");
    assert_eq!(
        git(&target.join("libs/lib"), &["rev-parse", "HEAD"]),
        library.head()
    );
}

#[test]
fn test_untracked_nested_repository_fails_loudly() {
    require_git!();
    let repo = TestRepo::init();
    repo.write("README.md", "# outer\n");
    repo.commit_all("initial");

    let nested = repo.path().join("nested");
    fs::create_dir(&nested).unwrap();
    git(&nested, &["init", "-q"]);
    repo.write("nested/file.txt", "inner\n");

    let out = TempDir::new().unwrap();
    let archive = out.path().join("outer.tar.gz");
    let ark = RepoArkBuilder::new().build().unwrap();
    let err = ark.archive(repo.path(), &archive).unwrap_err();

    assert!(matches!(err, ArkError::PlainDirectoryEntry { .. }));
    assert!(!archive.exists());
}

#[test]
fn test_tracked_files_missing_from_archive_survive_restore() {
    require_git!();
    let repo = sample_repo();
    repo.write("keep.txt", "tracked\n");
    repo.commit_all("add keep.txt");

    let out = TempDir::new().unwrap();
    let ark = RepoArkBuilder::new().build().unwrap();
    let full = out.path().join("full.tar.gz");
    ark.archive(repo.path(), &full).unwrap();

    let target = out.path().join("restored");
    ark.restore(&target, &full).unwrap();
    assert!(target.join("keep.txt").exists());

    // still in the index, but gone from the work tree and so from the archive
    fs::remove_file(repo.path().join("keep.txt")).unwrap();
    let partial = out.path().join("partial.tar.gz");
    ark.archive(repo.path(), &partial).unwrap();
    assert!(!archive_paths(&partial).contains(&"keep.txt".to_string()));

    fs::write(target.join("stray.txt"), "untracked\n").unwrap();
    let result = ark.restore(&target, &partial).unwrap();

    assert_eq!(result.files_deleted, 1);
    assert!(!target.join("stray.txt").exists());
    assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "tracked\n");
    assert!(git(&target, &["ls-files", "--", "keep.txt"]).contains("keep.txt"));
}

#[cfg(unix)]
#[test]
fn test_tracked_directory_symlink_fails_loudly() {
    require_git!();
    let repo = TestRepo::init();
    repo.write("realdir/f", "content\n");
    std::os::unix::fs::symlink("realdir", repo.path().join("link")).unwrap();
    repo.commit_all("link to a directory");

    let out = TempDir::new().unwrap();
    let archive = out.path().join("linked.tar.gz");
    let ark = RepoArkBuilder::new().build().unwrap();
    let err = ark.archive(repo.path(), &archive).unwrap_err();

    match err {
        ArkError::DirectorySymlink { path } => assert!(path.ends_with("link")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!archive.exists());
}

#[cfg(unix)]
#[test]
fn test_tracked_file_symlink_is_archived_as_content() {
    require_git!();
    let repo = TestRepo::init();
    repo.write("README.md", "# target\n");
    std::os::unix::fs::symlink("README.md", repo.path().join("readme-link")).unwrap();
    repo.commit_all("link to a file");

    let out = TempDir::new().unwrap();
    let archive = out.path().join("linked.tar.gz");
    let ark = RepoArkBuilder::new().build().unwrap();
    let summary = ark.archive(repo.path(), &archive).unwrap();
    assert_eq!(summary.roots_visited, 1);

    let target = out.path().join("restored");
    ark.restore(&target, &archive).unwrap();
    assert_eq!(fs::read_to_string(target.join("readme-link")).unwrap(), "# target\n");
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_file_name_fails_loudly() {
    use std::os::unix::ffi::OsStrExt;

    require_git!();
    let repo = TestRepo::init();
    repo.write("ok.txt", "ok\n");
    fs::write(repo.path().join(std::ffi::OsStr::from_bytes(b"caf\xe9.txt")), "latin-1\n").unwrap();
    repo.commit_all("non-UTF-8 name");

    let out = TempDir::new().unwrap();
    let archive = out.path().join("names.tar.gz");
    let ark = RepoArkBuilder::new().build().unwrap();
    let err = ark.archive(repo.path(), &archive).unwrap_err();

    assert!(matches!(err, ArkError::InvalidPathEncoding(_)));
    assert!(!archive.exists());
}

#[test]
fn test_subdirectory_is_not_a_repository_root() {
    require_git!();
    let repo = sample_repo();
    let out = TempDir::new().unwrap();

    let ark = RepoArkBuilder::new().build().unwrap();
    let err = ark
        .archive(&repo.path().join("src"), &out.path().join("src.tar.gz"))
        .unwrap_err();
    assert!(matches!(err, ArkError::NotARepository { .. }));
}

#[test]
fn test_git_query_failure_is_reported() {
    require_git!();
    let repo = sample_repo();
    let out = TempDir::new().unwrap();

    let ark = RepoArkBuilder::new()
        .git_program("git-binary-that-does-not-exist")
        .build()
        .unwrap();
    let err = ark
        .archive(repo.path(), &out.path().join("sample.tar.gz"))
        .unwrap_err();
    assert!(matches!(err, ArkError::QueryFailed { .. }));
}
