//! Archive containers.
//!
//! An archive is a `manifest.xml` plus content entries keyed by the `source`
//! names the manifest declares. Two containers are supported:
//!
//! - [`zipfile`] - a zip file (the usual interchange format)
//! - [`dir`] - a plain directory (handy for inspection and tests)
//!
//! Readers hand out the manifest as a fresh buffered stream on every call, so
//! the version pre-pass and the full parse can each read it from the start.

pub mod dir;
pub mod zipfile;

use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub use dir::{DirArchiveReader, DirArchiveWriter};
pub use zipfile::{ZipArchiveReader, ZipArchiveWriter};

/// Name of the manifest entry at the archive root.
pub const MANIFEST_NAME: &str = "manifest.xml";

/// Read side of an archive.
pub trait ArchiveReader {
    /// Where the archive lives, for messages.
    fn location(&self) -> &Path;

    /// A fresh stream over the manifest, positioned at its start.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be opened.
    fn manifest(&mut self) -> Result<Box<dyn BufRead>>;

    /// Bytes of an entry, `None` if the archive has no such entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be read.
    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Last-modified time of an entry in Unix milliseconds, if known.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be queried.
    fn entry_time(&mut self, name: &str) -> Result<Option<i64>>;
}

/// Write side of an archive.
pub trait ArchiveWriter {
    /// Add a content entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be written.
    fn write_entry(&mut self, name: &str, bytes: &[u8], modified: Option<i64>) -> Result<()>;

    /// Add the manifest, streamed from `manifest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be written.
    fn write_manifest(&mut self, manifest: &mut dyn Read) -> Result<()>;

    /// Flush and close the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be finalized.
    fn finish(&mut self) -> Result<()>;
}

/// Normalise a `source` key into an entry name: relative, forward slashes,
/// no `.` or `..` segments.
///
/// Returns `None` for keys that would escape the archive root.
#[must_use]
pub fn entry_name(source: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in source.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return None,
            other => parts.push(other),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn unreadable(path: &Path, reason: impl ToString) -> Error {
    Error::ArchiveUnreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Open an archive for reading, picking the container by what `path` is.
///
/// # Errors
///
/// Returns [`Error::ArchiveUnreadable`] if the path is missing, is not a
/// readable container, or has no manifest.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>> {
    if path.is_dir() {
        Ok(Box::new(DirArchiveReader::open(path)?))
    } else if path.is_file() {
        Ok(Box::new(ZipArchiveReader::open(path)?))
    } else {
        Err(unreadable(path, "no such file or directory"))
    }
}

/// Create an archive for writing.
///
/// # Errors
///
/// Returns an error if the target cannot be created.
pub fn create_archive(path: &Path, as_directory: bool) -> Result<Box<dyn ArchiveWriter>> {
    if as_directory {
        Ok(Box::new(DirArchiveWriter::create(path)?))
    } else {
        Ok(Box::new(ZipArchiveWriter::create(path)?))
    }
}

/// Default archive file name for an export started now.
#[must_use]
pub fn default_archive_name() -> PathBuf {
    PathBuf::from(format!(
        "export-{}.zip",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name("a.html").as_deref(), Some("a.html"));
        assert_eq!(entry_name("/b//c.html").as_deref(), Some("b/c.html"));
        assert_eq!(entry_name("./b\\c.html").as_deref(), Some("b/c.html"));
        assert_eq!(entry_name("../etc/passwd"), None);
        assert_eq!(entry_name("/"), None);
    }

    #[test]
    fn test_open_missing_archive() {
        let dir = TempDir::new().unwrap();
        let err = open_archive(&dir.path().join("nope.zip")).err().unwrap();
        assert!(matches!(err, Error::ArchiveUnreadable { .. }));
    }

    #[test]
    fn test_zip_and_dir_agree() {
        let dir = TempDir::new().unwrap();
        for as_directory in [false, true] {
            let target = dir.path().join(if as_directory { "out" } else { "out.zip" });
            let mut writer = create_archive(&target, as_directory).unwrap();
            writer
                .write_entry("b/c.html", b"<p>c</p>", Some(1_700_000_000_000))
                .unwrap();
            writer.write_manifest(&mut &b"<export/>"[..]).unwrap();
            writer.finish().unwrap();

            let mut reader = open_archive(&target).unwrap();
            let mut manifest = String::new();
            reader.manifest().unwrap().read_to_string(&mut manifest).unwrap();
            assert_eq!(manifest, "<export/>");
            assert_eq!(reader.read_entry("/b/c.html").unwrap().unwrap(), b"<p>c</p>");
            assert_eq!(reader.read_entry("missing").unwrap(), None);
            let time = reader.entry_time("b/c.html").unwrap().unwrap();
            // zip stores even seconds only
            assert!((time - 1_700_000_000_000).abs() <= 2_000);
        }
    }
}
