//! Directory archive container.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{ArchiveReader, ArchiveWriter, MANIFEST_NAME, entry_name, unreadable};
use crate::error::{Error, Result};

/// Reads an unpacked archive directory.
pub struct DirArchiveReader {
    root: PathBuf,
}

impl DirArchiveReader {
    /// Open a directory that holds a manifest at its root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveUnreadable`] if the manifest is missing.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.join(MANIFEST_NAME).is_file() {
            return Err(unreadable(root, format!("{MANIFEST_NAME} missing")));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn entry_path(&self, name: &str) -> Option<PathBuf> {
        entry_name(name).map(|n| self.root.join(n))
    }
}

impl ArchiveReader for DirArchiveReader {
    fn location(&self) -> &Path {
        &self.root
    }

    fn manifest(&mut self) -> Result<Box<dyn BufRead>> {
        let file = File::open(self.root.join(MANIFEST_NAME))
            .map_err(|e| unreadable(&self.root, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.entry_path(name) else {
            return Ok(None);
        };
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_time(&mut self, name: &str) -> Result<Option<i64>> {
        Ok(self.entry_path(name).and_then(|path| modified_millis(&path)))
    }
}

/// Writes an unpacked archive directory.
///
/// Entries are written to a temporary sibling, synced, then renamed into
/// place, so a failed export never leaves a truncated entry behind.
pub struct DirArchiveWriter {
    root: PathBuf,
}

impl DirArchiveWriter {
    /// Create the target directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn atomic_write(
        &self,
        name: &str,
        content: &mut dyn Read,
        modified: Option<i64>,
    ) -> Result<()> {
        let path = self.root.join(name);
        let temp_path = path.with_extension("part");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            io::copy(content, &mut writer)?;
            writer.flush()?;
            let file = writer.get_ref();
            if let Some(ms) = modified.and_then(|ms| u64::try_from(ms).ok()) {
                file.set_modified(UNIX_EPOCH + Duration::from_millis(ms))?;
            }
            file.sync_all()?;
        }

        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

impl ArchiveWriter for DirArchiveWriter {
    fn write_entry(&mut self, name: &str, bytes: &[u8], modified: Option<i64>) -> Result<()> {
        let entry = entry_name(name)
            .ok_or_else(|| Error::Export(format!("invalid archive entry name: {name}")))?;
        self.atomic_write(&entry, &mut &bytes[..], modified)
    }

    fn write_manifest(&mut self, manifest: &mut dyn Read) -> Result<()> {
        self.atomic_write(MANIFEST_NAME, manifest, None)
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

fn modified_millis(path: &Path) -> Option<i64> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t: SystemTime| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dir_without_manifest_is_unreadable() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DirArchiveReader::open(dir.path()),
            Err(Error::ArchiveUnreadable { .. })
        ));
    }

    #[test]
    fn test_writer_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let mut writer = DirArchiveWriter::create(dir.path()).unwrap();
        writer.write_entry("a/b.html", b"b", Some(1_000_000)).unwrap();
        writer.write_manifest(&mut &b"<export/>"[..]).unwrap();

        assert!(dir.path().join("a/b.html").is_file());
        assert!(!dir.path().join("a/b.part").exists());
        assert_eq!(modified_millis(&dir.path().join("a/b.html")), Some(1_000_000));
        assert!(writer.write_entry("../escape", b"x", None).is_err());
    }
}
