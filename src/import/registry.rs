//! Format registry and version detection.
//!
//! Before the real walk, a restricted pre-pass reads only the manifest
//! header. The declared `export_version` picks the dialect; a header without
//! one is the oldest dialect. Exactly one registered format may claim a
//! manifest and there is no fallback to a neighbouring version.
//!
//! Detection also walks the whole document once without any rules, so a
//! manifest that breaks off halfway is refused before the first entity is
//! stored.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use tracing::debug;

use super::formats::{ImportFormat, V2, V4, V7, V10};
use crate::archive::ArchiveReader;
use crate::error::{Error, Result};
use crate::manifest::{
    N_CREATEDATE, N_CREATOR, N_EXPORT, N_INFO, N_INFOPROJECT, N_PRODUCT_VERSION, N_VERSION, Rule,
    walk,
};

/// Version assumed when the header declares none.
pub const DEFAULT_VERSION: u32 = 2;

/// What the manifest header says about the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestInfo {
    /// Name of the document element.
    pub root: String,
    pub version: u32,
    /// Whether `export_version` was present or defaulted.
    pub version_declared: bool,
    pub creator: Option<String>,
    pub product_version: Option<String>,
    pub create_date: Option<String>,
    pub info_project: Option<String>,
}

/// Read the manifest header, stopping at the end of `info` or at the first
/// section after it.
///
/// # Errors
///
/// Returns [`Error::ManifestMalformed`] if the header is not well-formed,
/// the document is empty, or the version is not a number.
pub fn read_info(source: impl BufRead) -> Result<ManifestInfo> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut info = ManifestInfo::default();
    let mut version: Option<String> = None;
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match path.len() {
                    0 => info.root.clone_from(&name),
                    1 if name != N_INFO => break,
                    _ => {}
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if path.is_empty() {
                    info.root = name;
                    break;
                }
                if path.len() == 1 && name != N_INFO {
                    break;
                }
            }
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::End(_) => {
                let Some(name) = path.pop() else {
                    break;
                };
                if path.len() == 2 && path[1] == N_INFO {
                    let value = std::mem::take(&mut text);
                    match name.as_str() {
                        N_VERSION => version = Some(value),
                        N_CREATOR => info.creator = Some(value),
                        N_PRODUCT_VERSION => info.product_version = Some(value),
                        N_CREATEDATE => info.create_date = Some(value),
                        N_INFOPROJECT => info.info_project = Some(value),
                        _ => {}
                    }
                } else if path.len() == 1 && name == N_INFO {
                    break;
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if info.root.is_empty() {
        return Err(Error::ManifestMalformed("manifest has no document element".into()));
    }
    match version {
        Some(raw) => {
            info.version = raw.trim().parse().map_err(|_| {
                Error::ManifestMalformed(format!("{N_VERSION} '{raw}' is not a number"))
            })?;
            info.version_declared = true;
        }
        None => info.version = DEFAULT_VERSION,
    }
    Ok(info)
}

/// Check that the whole manifest is well-formed.
///
/// # Errors
///
/// Returns [`Error::ManifestMalformed`] at the first syntax error.
pub fn check_well_formed(source: impl BufRead) -> Result<()> {
    let rules: &[Rule<()>] = &[];
    walk(source, rules, |(), _| Ok(()))
}

/// The dialects an importer understands, in priority order.
pub struct FormatRegistry {
    formats: Vec<Box<dyn ImportFormat>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(V10));
        registry.register(Box::new(V7));
        registry.register(Box::new(V4));
        registry.register(Box::new(V2));
        registry
    }
}

impl FormatRegistry {
    /// A registry without any dialect.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Add a dialect; newer versions are always tried first.
    pub fn register(&mut self, format: Box<dyn ImportFormat>) {
        self.formats.push(format);
        self.formats.sort_by_key(|f| std::cmp::Reverse(f.version()));
    }

    /// Registered versions, newest first.
    #[must_use]
    pub fn versions(&self) -> Vec<u32> {
        self.formats.iter().map(|f| f.version()).collect()
    }

    /// The dialect registered for `version`.
    #[must_use]
    pub fn find(&self, version: u32) -> Option<&dyn ImportFormat> {
        self.formats
            .iter()
            .find(|f| f.version() == version)
            .map(AsRef::as_ref)
    }

    /// Pick the dialect that claims the archive's manifest.
    ///
    /// Nothing in the repository is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveUnreadable`] if the manifest cannot be read or
    /// is not well-formed anywhere in the document,
    /// [`Error::ManifestMalformed`] if the root element is not `export`, and
    /// [`Error::UnsupportedVersion`] if no dialect claims the version.
    pub fn detect(
        &self,
        archive: &mut dyn ArchiveReader,
    ) -> Result<(&dyn ImportFormat, ManifestInfo)> {
        let manifest = archive.manifest()?;
        let location = archive.location().to_path_buf();
        let unreadable = |e: Error| Error::ArchiveUnreadable {
            path: location.clone(),
            reason: e.to_string(),
        };
        let info = read_info(manifest).map_err(unreadable)?;
        check_well_formed(archive.manifest()?).map_err(unreadable)?;
        debug!(
            root = %info.root,
            version = info.version,
            declared = info.version_declared,
            "Read manifest header"
        );

        if info.root != N_EXPORT {
            return Err(Error::ManifestMalformed(format!(
                "document element is <{}>, expected <{N_EXPORT}>",
                info.root
            )));
        }
        match self.formats.iter().find(|f| f.matches(&info)) {
            Some(format) => Ok((format.as_ref(), info)),
            None => Err(Error::UnsupportedVersion {
                version: info.version,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, DirArchiveReader, DirArchiveWriter};
    use tempfile::TempDir;

    fn archive_with(dir: &TempDir, manifest: &str) -> DirArchiveReader {
        let root = dir.path().join("archive");
        let mut writer = DirArchiveWriter::create(&root).unwrap();
        writer.write_manifest(&mut manifest.as_bytes()).unwrap();
        writer.finish().unwrap();
        DirArchiveReader::open(&root).unwrap()
    }

    #[test]
    fn test_read_info_header() {
        let info = read_info(
            &br#"<?xml version="1.0"?>
            <export>
              <info>
                <creator>Admin</creator>
                <product_version>0.1.0</product_version>
                <createdate>Tue, 03 Sep 2024 10:00:00 GMT</createdate>
                <infoproject>Offline</infoproject>
                <export_version>7</export_version>
              </info>
              <files><file><destination>never/read</destination></file></files>
            </export>"#[..],
        )
        .unwrap();
        assert_eq!(info.root, "export");
        assert_eq!(info.version, 7);
        assert!(info.version_declared);
        assert_eq!(info.creator.as_deref(), Some("Admin"));
        assert_eq!(info.info_project.as_deref(), Some("Offline"));
    }

    #[test]
    fn test_missing_version_defaults_to_oldest() {
        let info = read_info(&b"<export><info><creator>x</creator></info><files/></export>"[..]).unwrap();
        assert_eq!(info.version, DEFAULT_VERSION);
        assert!(!info.version_declared);

        let bare = read_info(&b"<export><files/></export>"[..]).unwrap();
        assert_eq!(bare.version, DEFAULT_VERSION);
    }

    #[test]
    fn test_broken_body_is_unreadable() {
        const BROKEN: &str = "<export><info><export_version>10</export_version></info>\
            <files><file><destination>a.html</destination></file><file></files></export>";
        // The header alone reads fine.
        assert_eq!(read_info(BROKEN.as_bytes()).unwrap().version, 10);
        assert!(matches!(
            check_well_formed(BROKEN.as_bytes()),
            Err(Error::ManifestMalformed(_))
        ));

        let dir = TempDir::new().unwrap();
        let mut archive = archive_with(&dir, BROKEN);
        let err = FormatRegistry::default().detect(&mut archive).err().unwrap();
        assert!(matches!(err, Error::ArchiveUnreadable { .. }));
    }

    #[test]
    fn test_registry_priority() {
        let registry = FormatRegistry::default();
        assert_eq!(registry.versions(), vec![10, 7, 4, 2]);
        assert_eq!(registry.find(4).unwrap().name(), "v4");
        assert!(registry.find(5).is_none());
    }

    #[test]
    fn test_each_version_claimed_by_one_format() {
        let registry = FormatRegistry::default();
        for version in [2_u32, 4, 7, 10] {
            let info = ManifestInfo {
                root: "export".into(),
                version,
                ..ManifestInfo::default()
            };
            let claimed: Vec<u32> = registry
                .formats
                .iter()
                .filter(|f| f.matches(&info))
                .map(|f| f.version())
                .collect();
            assert_eq!(claimed, vec![version]);
        }
    }

    #[test]
    fn test_detect() {
        let dir = TempDir::new().unwrap();
        let registry = FormatRegistry::default();

        let mut v7 = archive_with(
            &dir,
            "<export><info><export_version>7</export_version></info></export>",
        );
        let (format, info) = registry.detect(&mut v7).unwrap();
        assert_eq!(format.version(), 7);
        assert_eq!(info.version, 7);

        let mut unknown = archive_with(
            &dir,
            "<export><info><export_version>5</export_version></info></export>",
        );
        let err = registry.detect(&mut unknown).err().unwrap();
        assert!(matches!(err, Error::UnsupportedVersion { version: 5 }));

        let mut wrong_root = archive_with(&dir, "<import><info/></import>");
        let err = registry.detect(&mut wrong_root).err().unwrap();
        assert!(matches!(err, Error::ManifestMalformed(_)));

        let mut garbage = archive_with(&dir, "<export><info><export_version>7</info>");
        let err = registry.detect(&mut garbage).err().unwrap();
        assert!(matches!(err, Error::ArchiveUnreadable { .. }));
    }
}
