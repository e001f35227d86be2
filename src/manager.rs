//! Entry point for imports and exports against one repository.

use parking_lot::Mutex;
use tracing::info;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::export::{ExportParameters, Exporter};
use crate::import::{FormatRegistry, ImportParameters, ImportSession, ManifestInfo};
use crate::report::{ExportStats, ImportStats, ReportSink};
use crate::repository::Repository;

/// Owns a repository handle and runs transfers against it.
///
/// Only one import may run per handle; a second one started while the
/// first holds the repository fails with [`Error::ImportInProgress`].
pub struct ArchiveManager<R: Repository> {
    repository: Mutex<R>,
    config: TransferConfig,
    registry: FormatRegistry,
}

impl<R: Repository> ArchiveManager<R> {
    pub fn new(repository: R, config: TransferConfig) -> Self {
        Self {
            repository: Mutex::new(repository),
            config,
            registry: FormatRegistry::default(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Read the manifest header and name the dialect that would import it.
    ///
    /// # Errors
    ///
    /// Same as [`FormatRegistry::detect`].
    pub fn inspect(&self, archive: &mut dyn ArchiveReader) -> Result<(ManifestInfo, &'static str)> {
        let (format, info) = self.registry.detect(archive)?;
        Ok((info, format.name()))
    }

    /// Import an archive.
    ///
    /// Detection happens before anything is written; an unreadable archive
    /// or an unknown version leaves the repository untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImportInProgress`] if another import holds the
    /// repository, detection errors, or [`Error::ManifestMalformed`] if the
    /// manifest breaks off. Problems with single entities only show up in
    /// the report and the statistics.
    pub fn import(
        &self,
        archive: &mut dyn ArchiveReader,
        params: &ImportParameters,
        report: &mut dyn ReportSink,
    ) -> Result<ImportStats> {
        let mut repository = self
            .repository
            .try_lock()
            .ok_or(Error::ImportInProgress)?;

        let (format, header) = self.registry.detect(archive)?;
        info!(
            archive = %archive.location().display(),
            format = format.name(),
            creator = header.creator.as_deref().unwrap_or(""),
            "Importing archive"
        );
        report.info(&format!(
            "importing {} (manifest version {})",
            archive.location().display(),
            header.version
        ));

        let manifest = archive.manifest()?;
        let mut session = ImportSession::new(&mut *repository, archive, report, &self.config, params);
        session.stats.format_version = format.version();
        if let Err(e) = format.import(manifest, &mut session) {
            session.abandon(&e.to_string());
            return Err(e);
        }
        let stats = session.finish()?;

        info!(
            processed = stats.total_processed(),
            failed = stats.total_failed(),
            unresolved = stats.unresolved,
            "Import finished"
        );
        Ok(stats)
    }

    /// Export resources and accounts into an archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Export`] or an I/O error if the archive cannot be
    /// written; the export stops at the first such failure.
    pub fn export(
        &self,
        writer: &mut dyn ArchiveWriter,
        params: &ExportParameters,
        report: &mut dyn ReportSink,
    ) -> Result<ExportStats> {
        let repository = self.repository.lock();
        Exporter::new(&*repository, &self.config, report).export(writer, params)
    }

    /// Run `f` with exclusive access to the repository.
    pub fn with_repository<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.repository.lock())
    }

    /// Give the repository back.
    pub fn into_inner(self) -> R {
        self.repository.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{DirArchiveReader, DirArchiveWriter};
    use crate::report::MemoryReport;
    use crate::repository::SqliteRepository;
    use tempfile::TempDir;

    fn archive(dir: &TempDir, manifest: &str) -> DirArchiveReader {
        let root = dir.path().join("archive");
        let mut writer = DirArchiveWriter::create(&root).unwrap();
        writer.write_manifest(&mut manifest.as_bytes()).unwrap();
        writer.finish().unwrap();
        DirArchiveReader::open(&root).unwrap()
    }

    #[test]
    fn test_second_import_refused_while_first_runs() {
        let dir = TempDir::new().unwrap();
        let manager = ArchiveManager::new(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
        );
        let mut reader = archive(&dir, "<export><info><export_version>10</export_version></info></export>");

        // Holding the repository stands in for an import in flight.
        manager.with_repository(|_| {
            let mut report = MemoryReport::new();
            let err = manager
                .import(&mut reader, &ImportParameters::default(), &mut report)
                .err()
                .unwrap();
            assert!(matches!(err, Error::ImportInProgress));
        });

        let mut report = MemoryReport::new();
        let stats = manager
            .import(&mut reader, &ImportParameters::default(), &mut report)
            .unwrap();
        assert_eq!(stats.format_version, 10);
    }

    #[test]
    fn test_unsupported_version_leaves_repository_untouched() {
        let dir = TempDir::new().unwrap();
        let manager = ArchiveManager::new(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
        );
        let mut reader = archive(
            &dir,
            "<export><info><export_version>99</export_version></info>\
             <files><file><destination>a.html</destination><type>plain</type></file></files></export>",
        );
        let mut report = MemoryReport::new();
        let err = manager
            .import(&mut reader, &ImportParameters::default(), &mut report)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedVersion { version: 99 }));
        assert!(!manager.with_repository(|repo| repo.exists("/a.html").unwrap()));
    }

    #[test]
    fn test_broken_manifest_body_leaves_repository_untouched() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("archive");
        let mut writer = DirArchiveWriter::create(&root).unwrap();
        writer.write_entry("a.html", b"a", None).unwrap();
        writer
            .write_manifest(
                &mut "<export><info><export_version>10</export_version></info><files>\
                      <file><source>a.html</source><destination>a.html</destination><type>plain</type></file>\
                      <file><destination>b.html</destination>\
                      </files></export>"
                    .as_bytes(),
            )
            .unwrap();
        writer.finish().unwrap();
        let mut reader = DirArchiveReader::open(&root).unwrap();

        let manager = ArchiveManager::new(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
        );
        let mut report = MemoryReport::new();
        let err = manager
            .import(&mut reader, &ImportParameters::default(), &mut report)
            .err()
            .unwrap();
        assert!(matches!(err, Error::ArchiveUnreadable { .. }));
        assert!(!manager.with_repository(|repo| repo.exists("/a.html").unwrap()));
    }

    #[test]
    fn test_inspect_names_format() {
        let dir = TempDir::new().unwrap();
        let manager = ArchiveManager::new(
            SqliteRepository::open_memory().unwrap(),
            TransferConfig::default(),
        );
        let mut reader = archive(&dir, "<export><info><creator>Admin</creator></info></export>");
        let (info, name) = manager.inspect(&mut reader).unwrap();
        assert_eq!(name, "v2");
        assert_eq!(info.creator.as_deref(), Some("Admin"));
    }
}
