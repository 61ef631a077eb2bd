//! Main test module for repoark
//!
//! This module includes all test suites:
//! - Integration tests against real git repositories
//! - Property-based tests for the restore decision

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use ::repoark::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::{self, File};
    use std::path::Path;
    use tempfile::TempDir;

    use crate::integration::{git, git_available, TestRepo};

    /// Write a gzip'd tar whose single entry has a raw, unvalidated name
    fn archive_with_raw_name(path: &Path, name: &[u8], entry_type: tar::EntryType) -> anyhow::Result<()> {
        let mut builder = tar::Builder::new(GzEncoder::new(File::create(path)?, Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(entry_type);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_mtime(1_650_000_000);
        header.set_cksum();
        builder.append(&header, &b"evil"[..])?;
        builder.into_inner()?.finish()?;
        Ok(())
    }

    #[test]
    fn test_repository_without_commits() {
        if !git_available() {
            return;
        }
        let repo = TestRepo::init();
        repo.write("draft.txt", "not committed yet\n");

        let out = TempDir::new().unwrap();
        let archive = out.path().join("fresh.tar.gz");
        let ark = RepoArkBuilder::new().build().unwrap();
        ark.archive(repo.path(), &archive).unwrap();

        let target = out.path().join("restored");
        ark.restore(&target, &archive).unwrap();
        assert_eq!(fs::read_to_string(target.join("draft.txt")).unwrap(), "not committed yet\n");
        assert_eq!(git(&target, &["status", "--porcelain"]), "?? draft.txt");
    }

    #[test]
    fn test_special_filenames() {
        if !git_available() {
            return;
        }
        let repo = TestRepo::init();
        let names = [
            "file with spaces.txt",
            "unicode-文件.txt",
            "quote\"d.txt",
            "dir with space/inner.txt",
        ];
        for name in names {
            repo.write(name, name);
        }
        repo.commit_all("special names");

        let out = TempDir::new().unwrap();
        let archive = out.path().join("special.tar.gz");
        let ark = RepoArkBuilder::new().build().unwrap();
        ark.archive(repo.path(), &archive).unwrap();

        let target = out.path().join("restored");
        ark.restore(&target, &archive).unwrap();
        for name in names {
            assert_eq!(fs::read_to_string(target.join(name)).unwrap(), name);
        }
    }

    #[test]
    fn test_missing_and_non_directory_paths() {
        let temp_dir = TempDir::new().unwrap();
        let ark = RepoArkBuilder::new().build().unwrap();
        let output = temp_dir.path().join("out.tar.gz");

        let err = ark.archive(&temp_dir.path().join("missing"), &output).unwrap_err();
        assert!(matches!(err, ArkError::PathNotFound { .. }));

        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let err = ark.archive(&file, &output).unwrap_err();
        assert!(matches!(err, ArkError::NotADirectory { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_escaping_entry_is_rejected() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let archive = temp_dir.path().join("evil.tar.gz");
        archive_with_raw_name(&archive, b"../outside.txt", tar::EntryType::Regular)?;

        let target = temp_dir.path().join("target");
        let ark = RepoArkBuilder::new().build()?;
        let err = ark.restore(&target, &archive).unwrap_err();

        assert!(matches!(err, ArkError::UnsafeEntryPath(_)));
        assert!(!temp_dir.path().join("outside.txt").exists());
        Ok(())
    }

    #[test]
    fn test_unsupported_entry_kind_is_rejected() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let archive = temp_dir.path().join("fifo.tar.gz");
        archive_with_raw_name(&archive, b"pipe", tar::EntryType::Fifo)?;

        let target = temp_dir.path().join("target");
        let ark = RepoArkBuilder::new().build()?;
        let err = ark.restore(&target, &archive).unwrap_err();
        assert!(matches!(err, ArkError::UnsupportedEntryKind { .. }));
        Ok(())
    }

    #[test]
    fn test_default_archive_name_for_dot() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let repo = temp_dir.path().join("project");
        fs::create_dir(&repo)?;
        fs::write(temp_dir.path().join("project.tar.gz"), b"")?;

        let name = find_available_archive_name(&repo.join("."), temp_dir.path())?;
        assert_eq!(name, temp_dir.path().join("project-1.tar.gz"));
        Ok(())
    }
}
