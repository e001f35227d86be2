//! Archive export.
//!
//! The exporter walks the live tree top-down and streams every entity into
//! the manifest as soon as it is built, so memory stays flat regardless of
//! tree size. The manifest is spooled to a temporary file and copied into
//! the archive last; content entries go straight into the archive, once per
//! resource id. Exports always use the newest manifest dialect.

mod accounts;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom};

use tracing::{debug, info, warn};

use crate::archive::ArchiveWriter;
use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::manifest::dates::{MACRO_FILETIME, MACRO_IMPORTTIME, format_date, format_date_value};
use crate::manifest::{
    A_TYPE, ManifestWriter, N_ACCESSCONTROL, N_ACCESSENTRY, N_ALLOWED, N_CREATEDATE, N_CREATOR,
    N_DATECREATED, N_DATEEXPIRED, N_DATELASTMODIFIED, N_DATERELEASED, N_DENIED, N_DESTINATION,
    N_FILE, N_FILES, N_FLAGS, N_ID, N_INFO, N_INFOPROJECT, N_NAME, N_PATH, N_PERMISSIONSET,
    N_PRODUCT_VERSION, N_PROPERTIES, N_PROPERTY, N_RELATION, N_RELATIONS, N_SOURCE, N_TYPE,
    N_USERCREATED, N_USERLASTMODIFIED, N_UUIDPRINCIPAL, N_UUIDRESOURCE, N_UUIDSTRUCTURE, N_VALUE,
    N_VERSION, Node, V_SHARED,
};
use crate::model::property::{PROPERTY_EXPORT_TIMESTAMP, filter_properties};
use crate::model::resource::{DATE_EXPIRED_DEFAULT, DATE_RELEASED_DEFAULT};
use crate::model::{DateValue, PropertyValue, Resource};
use crate::report::{ExportStats, ReportSink};
use crate::repository::{Repository, ResourceFilter};

/// Manifest version every export is written in.
pub const EXPORT_VERSION: u32 = 10;

type Spool = ManifestWriter<BufWriter<File>>;

/// Caller choices for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportParameters {
    /// Repository paths to export; folders include their contents.
    pub roots: Vec<String>,
    pub include_accounts: bool,
    pub include_projects: bool,
    /// Leave out ids, user names, creation dates and default release and
    /// expiry dates.
    pub reduced: bool,
    /// Only files modified at or after this time (Unix milliseconds).
    /// Folders are always exported.
    pub modified_since: Option<i64>,
    /// Descend into subfolders.
    pub recursive: bool,
}

impl Default for ExportParameters {
    fn default() -> Self {
        Self {
            roots: vec!["/".to_string()],
            include_accounts: false,
            include_projects: false,
            reduced: false,
            modified_since: None,
            recursive: true,
        }
    }
}

/// How the dates of one resource are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampMode {
    Literal,
    FileTime,
    ImportTime,
}

impl TimestampMode {
    fn of(properties: &[PropertyValue]) -> Self {
        let value = properties
            .iter()
            .find(|p| p.name == PROPERTY_EXPORT_TIMESTAMP)
            .and_then(PropertyValue::value)
            .map(str::trim);
        match value {
            Some(v) if v.eq_ignore_ascii_case("FILETIME") || v == MACRO_FILETIME => Self::FileTime,
            Some(v) if v.eq_ignore_ascii_case("IMPORTTIME") || v == MACRO_IMPORTTIME => {
                Self::ImportTime
            }
            _ => Self::Literal,
        }
    }

    fn encode(self, millis: i64) -> String {
        match self {
            Self::Literal => format_date(millis),
            Self::FileTime => format_date_value(DateValue::FileTime),
            Self::ImportTime => format_date_value(DateValue::ImportTime),
        }
    }
}

/// Manifest path for a repository path.
fn archive_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Streams part of a repository into an archive.
pub struct Exporter<'a> {
    repo: &'a dyn Repository,
    config: &'a TransferConfig,
    report: &'a mut dyn ReportSink,
    stats: ExportStats,
    /// Resource ids whose content is already in the archive.
    /// Resource id to the archive entry holding its content.
    exported_contents: HashMap<String, String>,
    /// Paths already written, so overlapping roots export once.
    visited: HashSet<String>,
}

impl<'a> Exporter<'a> {
    pub fn new(
        repo: &'a dyn Repository,
        config: &'a TransferConfig,
        report: &'a mut dyn ReportSink,
    ) -> Self {
        Self {
            repo,
            config,
            report,
            stats: ExportStats::default(),
            exported_contents: HashMap::new(),
            visited: HashSet::new(),
        }
    }

    /// Run the export.
    ///
    /// # Errors
    ///
    /// Returns an error as soon as the manifest or an archive entry cannot
    /// be written. Resources that vanish or cannot be described are
    /// reported and skipped.
    pub fn export(
        mut self,
        archive: &mut dyn ArchiveWriter,
        params: &ExportParameters,
    ) -> Result<ExportStats> {
        let spool = tempfile::tempfile()?;
        let mut manifest = ManifestWriter::new(BufWriter::new(spool))?;

        manifest.write(&self.info_node())?;

        if params.include_accounts {
            info!("Exporting accounts");
            self.write_accounts(&mut manifest)?;
        }

        info!(roots = ?params.roots, "Exporting resources");
        manifest.open(N_FILES)?;
        for root in &params.roots {
            self.export_root(&mut manifest, archive, root, params)?;
        }
        manifest.close()?;

        if params.include_projects {
            info!("Exporting projects");
            self.write_projects(&mut manifest)?;
        }

        let mut spooled = manifest
            .finish()?
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        spooled.seek(SeekFrom::Start(0))?;
        archive.write_manifest(&mut spooled)?;
        archive.finish()?;

        info!(
            folders = self.stats.folders,
            files = self.stats.files,
            contents = self.stats.contents,
            "Export finished"
        );
        Ok(self.stats)
    }

    fn info_node(&self) -> Node {
        Node::new(N_INFO)
            .child(Node::leaf(N_CREATOR, self.repo.current_user()))
            .child(Node::leaf(N_PRODUCT_VERSION, env!("CARGO_PKG_VERSION")))
            .child(Node::leaf(
                N_CREATEDATE,
                format_date(chrono::Utc::now().timestamp_millis()),
            ))
            .child(Node::leaf(N_INFOPROJECT, self.repo.current_project()))
            .child(Node::leaf(N_VERSION, EXPORT_VERSION.to_string()))
    }

    fn export_root(
        &mut self,
        manifest: &mut Spool,
        archive: &mut dyn ArchiveWriter,
        root: &str,
        params: &ExportParameters,
    ) -> Result<()> {
        let Some(resource) = self.repo.read_resource(root, ResourceFilter::DEFAULT)? else {
            warn!(root, "Export root does not exist");
            self.report
                .warning(&format!("export root {root} does not exist"));
            return Ok(());
        };
        if resource.is_folder {
            self.export_folder(manifest, archive, &resource, params)
        } else {
            self.export_file(manifest, archive, &resource, params)
        }
    }

    /// The folder, then its files, then its subfolders.
    fn export_folder(
        &mut self,
        manifest: &mut Spool,
        archive: &mut dyn ArchiveWriter,
        folder: &Resource,
        params: &ExportParameters,
    ) -> Result<()> {
        // The root folder always exists and has no manifest path.
        if folder.path != "/" && self.visited.insert(folder.path.clone()) {
            self.write_resource(manifest, archive, folder, params)?;
            self.stats.folders += 1;
        }

        let children = self.repo.read_children(&folder.path, ResourceFilter::DEFAULT)?;
        let (folders, files): (Vec<Resource>, Vec<Resource>) =
            children.into_iter().partition(|r| r.is_folder);

        for file in &files {
            self.export_file(manifest, archive, file, params)?;
        }
        if params.recursive {
            for sub in &folders {
                self.export_folder(manifest, archive, sub, params)?;
            }
        }
        Ok(())
    }

    fn export_file(
        &mut self,
        manifest: &mut Spool,
        archive: &mut dyn ArchiveWriter,
        file: &Resource,
        params: &ExportParameters,
    ) -> Result<()> {
        if params
            .modified_since
            .is_some_and(|since| file.date_last_modified < since)
        {
            debug!(path = %file.path, "Older than the age filter, skipped");
            return Ok(());
        }
        if !self.visited.insert(file.path.clone()) {
            return Ok(());
        }
        self.write_resource(manifest, archive, file, params)?;
        self.stats.files += 1;
        Ok(())
    }

    fn write_resource(
        &mut self,
        manifest: &mut Spool,
        archive: &mut dyn ArchiveWriter,
        resource: &Resource,
        params: &ExportParameters,
    ) -> Result<()> {
        let path = archive_path(&resource.path);
        let all_properties = self.repo.read_properties(&resource.path)?;
        let mode = TimestampMode::of(&all_properties);
        let properties = filter_properties(all_properties, &self.config.ignored_properties);

        let mut node = Node::new(N_FILE);

        if !resource.is_folder {
            match self.exported_contents.get(&resource.resource_id) {
                // Without a resource id a later sibling can only find its
                // bytes through the entry the first one wrote.
                Some(entry) if params.reduced => node.push_leaf(N_SOURCE, entry.as_str()),
                Some(_) => {}
                None => {
                    let bytes = self.repo.read_content(&resource.path)?;
                    archive.write_entry(path, &bytes, Some(resource.date_last_modified))?;
                    self.stats.contents += 1;
                    self.exported_contents
                        .insert(resource.resource_id.clone(), path.to_string());
                    node.push_leaf(N_SOURCE, path);
                }
            }
        }
        node.push_leaf(N_DESTINATION, path);
        node.push_leaf(N_TYPE, resource.type_name.as_str());
        if !params.reduced {
            node.push_leaf(N_UUIDSTRUCTURE, resource.structure_id.as_str());
            if !resource.is_folder {
                node.push_leaf(N_UUIDRESOURCE, resource.resource_id.as_str());
            }
        }
        node.push_leaf(N_DATELASTMODIFIED, mode.encode(resource.date_last_modified));
        if !params.reduced {
            node.push_leaf(N_USERLASTMODIFIED, resource.user_last_modified.as_str());
            node.push_leaf(N_DATECREATED, mode.encode(resource.date_created));
            node.push_leaf(N_USERCREATED, resource.user_created.as_str());
        }
        if !params.reduced || resource.date_released != DATE_RELEASED_DEFAULT {
            node.push_leaf(N_DATERELEASED, format_date(resource.date_released));
        }
        if !params.reduced || resource.date_expired != DATE_EXPIRED_DEFAULT {
            node.push_leaf(N_DATEEXPIRED, format_date(resource.date_expired));
        }
        node.push_leaf(N_FLAGS, resource.flags.to_string());

        node.push_nonempty(properties_node(&properties));
        node.push_nonempty(self.relations_node(&resource.path, params.reduced)?);
        node.push_nonempty(self.acl_node(&resource.path)?);

        manifest.write(&node)?;
        debug!(path = %resource.path, "Exported resource");
        Ok(())
    }

    /// Declared relations only; content-defined ones come back from the
    /// content on import.
    fn relations_node(&self, path: &str, reduced: bool) -> Result<Node> {
        let mut relations = Node::new(N_RELATIONS);
        for relation in self.repo.read_relations(path)? {
            if relation.is_content_defined() {
                continue;
            }
            let mut node = Node::new(N_RELATION);
            if !reduced {
                node.push_leaf(N_ID, relation.target_id);
            }
            node.push_leaf(N_PATH, relation.target_path);
            node.push_leaf(N_TYPE, relation.relation_type);
            relations.push(node);
        }
        Ok(relations)
    }

    /// Entries set on the resource itself, with typed principals.
    fn acl_node(&mut self, path: &str) -> Result<Node> {
        let mut acl = Node::new(N_ACCESSCONTROL);
        for ace in self.repo.read_aces(path)? {
            if ace.is_inherited() {
                continue;
            }
            let Some(principal) = self.repo.describe_principal(&ace.principal_id)? else {
                self.report.warning(&format!(
                    "{path}: access entry for unknown principal {} not exported",
                    ace.principal_id
                ));
                continue;
            };
            acl.push(
                Node::new(N_ACCESSENTRY)
                    .child(Node::leaf(N_UUIDPRINCIPAL, principal.to_string()))
                    .child(Node::leaf(N_FLAGS, ace.flags.to_string()))
                    .child(
                        Node::new(N_PERMISSIONSET)
                            .child(Node::leaf(N_ALLOWED, ace.allowed.to_string()))
                            .child(Node::leaf(N_DENIED, ace.denied.to_string())),
                    ),
            );
        }
        Ok(acl)
    }
}

fn properties_node(properties: &[PropertyValue]) -> Node {
    let mut node = Node::new(N_PROPERTIES);
    for prop in properties {
        if let Some(value) = &prop.structure_value {
            node.push(
                Node::new(N_PROPERTY)
                    .child(Node::leaf(N_NAME, prop.name.as_str()))
                    .child(Node::leaf(N_VALUE, value.as_str())),
            );
        }
        if let Some(value) = &prop.resource_value {
            node.push(
                Node::new(N_PROPERTY)
                    .attr(A_TYPE, V_SHARED)
                    .child(Node::leaf(N_NAME, prop.name.as_str()))
                    .child(Node::leaf(N_VALUE, value.as_str())),
            );
        }
    }
    node
}
