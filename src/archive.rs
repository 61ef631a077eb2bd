//! Archive container: gzip-compressed tar
//!
//! The container is a plain sequential stream of regular-file entries. Each
//! header carries the `/`-separated path, size, permission bits and
//! modification time in whole seconds; content follows the header. No
//! directory entries are written: directories are implied by file paths.
//!
//! ## Writing
//!
//! ```rust,no_run
//! use repoark::archive::ArchiveWriter;
//! use repoark::types::ArchiveEntry;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let entry = ArchiveEntry::from_file(Path::new("repo/README.md"), "README.md".to_string())?;
//! let mut writer = ArchiveWriter::create(Path::new("repo.tar.gz"), 6)?;
//! writer.append(&entry)?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading
//!
//! Entries are visited in stream order through [`ArchiveReader::for_each_entry`],
//! which hands the callback the decoded header and a reader over the content.

use crate::error::{ArkError, Result};
use crate::types::{ArchiveEntry, EntryHeader, EntryKind, ProgressInfo};
use crate::utils;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tar::{EntryType, Header};
use tracing::{debug, trace};

/// Default gzip level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Serializes archive entries into a gzip-compressed tar stream
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
    files_written: usize,
    bytes_written: u64,
}

impl ArchiveWriter<BufWriter<File>> {
    /// Create (or truncate) the archive file at `path`
    pub fn create(path: &Path, level: u32) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), level))
    }
}

impl<W: Write> ArchiveWriter<W> {
    /// Wrap any writer; `level` is clamped to 0-9
    pub fn new(inner: W, level: u32) -> Self {
        let encoder = GzEncoder::new(inner, Compression::new(level.min(9)));
        Self {
            builder: tar::Builder::new(encoder),
            files_written: 0,
            bytes_written: 0,
        }
    }

    /// Append one regular file
    ///
    /// Size, mode and modification time come from the opened file, so the
    /// header always describes the bytes that follow it. Returns the number
    /// of content bytes written.
    pub fn append(&mut self, entry: &ArchiveEntry) -> Result<u64> {
        if entry.kind != EntryKind::File {
            return Err(ArkError::UnsupportedEntryKind {
                path: entry.path.clone(),
                kind: format!("{:?}", entry.kind),
            });
        }

        let file = File::open(&entry.source)?;
        let metadata = file.metadata()?;
        let size = metadata.len();

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(utils::get_permissions(&metadata) & 0o7777);
        header.set_mtime(utils::round_to_second(metadata.modified()?).max(0) as u64);

        let mut content = ExactReader::new(file, size);
        self.builder.append_data(&mut header, &entry.path, &mut content)?;

        self.files_written += 1;
        self.bytes_written += size;
        Ok(size)
    }

    /// Append every entry in order, reporting progress per file
    ///
    /// Returns the number of files and content bytes written.
    pub fn write_all<F>(&mut self, entries: &[ArchiveEntry], progress_callback: Option<F>) -> Result<(usize, u64)>
    where
        F: Fn(ProgressInfo),
    {
        let start_files = self.files_written;
        let start_bytes = self.bytes_written;

        for (idx, entry) in entries.iter().enumerate() {
            debug!("add {}", entry.path);
            self.append(entry)?;

            if let Some(ref callback) = progress_callback {
                callback(ProgressInfo {
                    operation: "add".to_string(),
                    current_item: Some(entry.path.clone()),
                    processed: idx + 1,
                    total: Some(entries.len()),
                    bytes_processed: self.bytes_written - start_bytes,
                });
            }
        }

        Ok((self.files_written - start_files, self.bytes_written - start_bytes))
    }

    /// Number of files appended so far
    pub fn files_written(&self) -> usize {
        self.files_written
    }

    /// Content bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write the tar trailer and gzip footer, returning the inner writer
    pub fn finish(self) -> Result<W> {
        let encoder = self.builder.into_inner()?;
        let mut inner = encoder.finish()?;
        inner.flush()?;
        trace!("Archive finished after {} files", self.files_written);
        Ok(inner)
    }
}

/// Reads exactly `remaining` bytes, failing if the source ends early
///
/// A file that shrinks while being archived would otherwise leave a header
/// whose size disagrees with the content that follows it.
struct ExactReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ExactReader<R> {
    fn new(inner: R, remaining: u64) -> Self {
        Self { inner, remaining }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let read = self.inner.read(&mut buf[..max])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank while archiving, {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

/// Deserializes entries from a gzip-compressed tar stream
pub struct ArchiveReader<R: Read> {
    archive: tar::Archive<GzDecoder<R>>,
}

impl ArchiveReader<File> {
    /// Open the archive file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> ArchiveReader<R> {
    /// Wrap any reader producing gzip data
    pub fn new(inner: R) -> Self {
        Self {
            archive: tar::Archive::new(GzDecoder::new(inner)),
        }
    }

    /// Visit every entry in stream order
    ///
    /// The callback receives the decoded header and a reader positioned at
    /// the entry's content. Unread content is skipped automatically.
    ///
    /// # Errors
    ///
    /// - [`ArkError::UnsupportedEntryKind`] for symlinks, hard links, devices, FIFOs
    /// - [`ArkError::UnsafeEntryPath`] for absolute, escaping or non-UTF-8 paths
    /// - Any error returned by the callback, which stops iteration
    pub fn for_each_entry<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(EntryHeader, &mut dyn Read) -> Result<()>,
    {
        for entry in self.archive.entries()? {
            let mut entry = entry?;
            let header = match read_header(&entry)? {
                Some(header) => header,
                None => continue,
            };
            f(header, &mut entry)?;
        }
        Ok(())
    }

    /// Collect all headers, discarding content
    pub fn headers(&mut self) -> Result<Vec<EntryHeader>> {
        let mut headers = Vec::new();
        self.for_each_entry(|header, _| {
            headers.push(header);
            Ok(())
        })?;
        Ok(headers)
    }
}

/// Decode a tar header; `None` for metadata-only records
fn read_header<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Option<EntryHeader>> {
    let raw_path = String::from_utf8(entry.path_bytes().into_owned())
        .map_err(|e| ArkError::UnsafeEntryPath(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;

    let entry_type = entry.header().entry_type();
    let kind = if entry_type.is_file() || entry_type.is_contiguous() {
        EntryKind::File
    } else if entry_type.is_dir() {
        EntryKind::Directory
    } else if entry_type.is_pax_global_extensions() {
        trace!("Ignoring pax global header");
        return Ok(None);
    } else {
        return Err(ArkError::UnsupportedEntryKind {
            path: raw_path,
            kind: format!("{:?}", entry_type),
        });
    };

    let header = entry.header();
    Ok(Some(EntryHeader {
        path: utils::sanitize_entry_path(&raw_path)?,
        kind,
        size: entry.size(),
        mode: header.mode()? & 0o7777,
        modified: utils::system_time_from_secs(header.mtime()? as i64),
    }))
}
