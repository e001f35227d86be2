//! Zip archive container.
//!
//! The manifest entry is spooled into an anonymous temporary file when the
//! archive is opened. Parsing then streams from that file while content
//! entries are read from the zip independently.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::{ArchiveReader, ArchiveWriter, MANIFEST_NAME, entry_name, unreadable};
use crate::error::{Error, Result};

/// Reads a zip archive.
pub struct ZipArchiveReader {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    manifest: File,
}

impl ZipArchiveReader {
    /// Open a zip file and spool its manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveUnreadable`] if the file is not a zip or has
    /// no manifest.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| unreadable(path, e))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| unreadable(path, e))?;

        let mut manifest = tempfile::tempfile()?;
        {
            let mut entry = archive.by_name(MANIFEST_NAME).map_err(|e| match e {
                ZipError::FileNotFound => unreadable(path, format!("{MANIFEST_NAME} missing")),
                other => unreadable(path, other),
            })?;
            io::copy(&mut entry, &mut manifest)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            manifest,
        })
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn location(&self) -> &Path {
        &self.path
    }

    fn manifest(&mut self) -> Result<Box<dyn BufRead>> {
        let mut file = self.manifest.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(name) = entry_name(name) else {
            return Ok(None);
        };
        match self.archive.by_name(&name) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
                entry.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_time(&mut self, name: &str) -> Result<Option<i64>> {
        let Some(name) = entry_name(name) else {
            return Ok(None);
        };
        match self.archive.by_name(&name) {
            Ok(entry) => Ok(zip_time_to_millis(entry.last_modified())),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes a zip archive.
pub struct ZipArchiveWriter {
    zip: ZipWriter<BufWriter<File>>,
}

impl ZipArchiveWriter {
    /// Create (or truncate) a zip file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            zip: ZipWriter::new(BufWriter::new(file)),
        })
    }

    fn options(modified: Option<i64>) -> FileOptions {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        match modified.and_then(millis_to_zip_time) {
            Some(time) => options.last_modified_time(time),
            None => options,
        }
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn write_entry(&mut self, name: &str, bytes: &[u8], modified: Option<i64>) -> Result<()> {
        let name = entry_name(name)
            .ok_or_else(|| Error::Export(format!("invalid archive entry name: {name}")))?;
        self.zip.start_file(name, Self::options(modified))?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    fn write_manifest(&mut self, manifest: &mut dyn Read) -> Result<()> {
        self.zip.start_file(MANIFEST_NAME, Self::options(None))?;
        io::copy(manifest, &mut self.zip)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut inner = self.zip.finish()?;
        inner.flush()?;
        Ok(())
    }
}

fn zip_time_to_millis(time: DateTime) -> Option<i64> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    Some(Utc.from_utc_datetime(&naive).timestamp_millis())
}

fn millis_to_zip_time(millis: i64) -> Option<DateTime> {
    let at = Utc.timestamp_millis_opt(millis).single()?;
    DateTime::from_date_and_time(
        u16::try_from(at.year()).ok()?,
        u8::try_from(at.month()).ok()?,
        u8::try_from(at.day()).ok()?,
        u8::try_from(at.hour()).ok()?,
        u8::try_from(at.minute()).ok()?,
        u8::try_from(at.second()).ok()?,
    )
    .ok()
}
