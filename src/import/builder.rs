//! Turns a finished file accumulator into a stored resource.

use tracing::debug;

use super::accumulator::{FileAccumulator, date_field};
use super::rewrite::ImportedResource;
use super::session::ImportSession;
use crate::error::{Error, Result};
use crate::model::relation::{is_content_defined, is_valid_relation_type};
use crate::model::resource::{
    DATE_EXPIRED_DEFAULT, DATE_RELEASED_DEFAULT, FOLDER_TYPE, join_path,
};
use crate::model::property::filter_properties;
use crate::model::{AceRecord, DateValue, RelationRef, ResourceRecord};
use crate::report::EntityStats;
use crate::repository::ResourceFilter;

/// What happened to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Created,
    Updated,
    Skipped,
}

impl Outcome {
    pub(crate) fn count(self, stats: &mut EntityStats) {
        match self {
            Self::Created => stats.created += 1,
            Self::Updated => stats.updated += 1,
            Self::Skipped => stats.skipped += 1,
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn missing(field: &'static str) -> Error {
    Error::InvalidValue {
        field,
        value: String::new(),
    }
}

impl ImportSession<'_> {
    /// Whether `path` is protected and already present. `true` means skip.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be queried.
    pub fn check_immutable(&self, path: &str) -> Result<bool> {
        Ok(self.config.is_immutable(path) && self.repo.exists(path)?)
    }

    /// Build and store the file entry that just closed.
    ///
    /// Every entry consumes a sequence index, whether or not it is stored,
    /// so relation sources stay aligned with the manifest.
    pub(crate) fn build_file(&mut self, file: FileAccumulator) {
        let index = self.sequence;
        self.sequence += 1;
        let label = file
            .destination
            .clone()
            .unwrap_or_else(|| format!("entry #{index}"));

        if let Some(reason) = file.pending.error() {
            let reason = reason.to_string();
            self.entity_failed("resource", &label, &reason);
            self.stats.resources.failed += 1;
            return;
        }

        match self.store_file(index, file) {
            Ok(outcome) => outcome.count(&mut self.stats.resources),
            Err(e) => {
                self.entity_failed("resource", &label, &e.to_string());
                self.stats.resources.failed += 1;
            }
        }
    }

    fn store_file(&mut self, index: usize, file: FileAccumulator) -> Result<Outcome> {
        let destination = file.destination.as_deref().ok_or_else(|| missing("destination"))?;
        let type_name = file.type_name.clone().ok_or_else(|| missing("type"))?;
        let path = join_path(&self.params.base_path, destination);

        if self.check_immutable(&path)? {
            debug!(path = %path, "Immutable resource exists, skipping");
            self.report
                .notice(&format!("{path} is immutable and already exists, skipped"));
            return Ok(Outcome::Skipped);
        }

        let is_folder = type_name == FOLDER_TYPE;
        let existing = self.repo.read_resource(&path, ResourceFilter::ALL)?;
        if is_folder && existing.is_some() && file.structure_id.is_none() {
            debug!(path = %path, "Folder exists and entry carries no id, skipping");
            return Ok(Outcome::Skipped);
        }

        let structure_id = file.structure_id.clone().unwrap_or_else(new_id);
        let resource_id = if is_folder {
            new_id()
        } else {
            file.resource_id.clone().unwrap_or_else(new_id)
        };

        let (content, file_time) = self.read_content(is_folder, file.source.as_deref(), &resource_id)?;

        let mut record = ResourceRecord {
            structure_id,
            resource_id,
            path: path.clone(),
            type_name: type_name.clone(),
            is_folder,
            flags: file.flags,
            date_created: file
                .date(date_field::CREATED)
                .unwrap_or(DateValue::ImportTime),
            user_created: file.user_created.clone(),
            date_last_modified: file
                .date(date_field::LAST_MODIFIED)
                .unwrap_or(DateValue::ImportTime),
            user_last_modified: file.user_last_modified.clone(),
            date_released: file
                .date(date_field::RELEASED)
                .unwrap_or(DateValue::At(DATE_RELEASED_DEFAULT)),
            date_expired: file
                .date(date_field::EXPIRED)
                .unwrap_or(DateValue::At(DATE_EXPIRED_DEFAULT)),
            content_length: content.as_ref().map_or(0, |c| c.len() as u64),
            sibling_count: 1,
        };
        record.resolve_dates(file_time, self.import_time);

        let properties = filter_properties(file.properties, &self.config.ignored_properties);
        for prop in &properties {
            if !self.repo.has_property_definition(&prop.name)? {
                debug!(name = %prop.name, "Creating property definition");
                self.repo.create_property_definition(&prop.name)?;
            }
        }

        let resource = self
            .repo
            .import_resource(&record, content.as_deref(), &properties)?;
        debug!(path = %resource.path, index, "Imported resource");

        self.materialized.insert(index, resource.structure_id.clone());
        if !is_folder {
            self.imported_contents.insert(resource.resource_id.clone());
        }

        for relation in file.relations {
            if !is_valid_relation_type(&relation.relation_type)
                || (relation.path.is_empty() && relation.id.is_none())
            {
                self.report.warning(&format!(
                    "{path}: ignoring malformed relation {} to '{}'",
                    relation.relation_type, relation.path
                ));
                continue;
            }
            if is_content_defined(&relation.relation_type) {
                // Recreated from the content by link rewriting.
                continue;
            }
            self.relations.add(RelationRef {
                source_index: index,
                target_path: relation.path,
                target_id: relation.id,
                relation_type: relation.relation_type,
            });
        }

        let replace_acl = existing.is_none() || !self.params.keep_permissions;
        if replace_acl && (existing.is_some() || !file.aces.is_empty()) {
            self.apply_aces(&path, &file.aces)?;
        }

        self.imported.push(ImportedResource {
            path: resource.path,
            type_name,
            date_last_modified: resource.date_last_modified,
        });

        Ok(if existing.is_some() {
            Outcome::Updated
        } else {
            Outcome::Created
        })
    }

    /// Content bytes for a new placement and the entry's file time.
    ///
    /// Bytes are read once per resource id; later siblings get `None`,
    /// which makes the repository share the stored content.
    fn read_content(
        &mut self,
        is_folder: bool,
        source: Option<&str>,
        resource_id: &str,
    ) -> Result<(Option<Vec<u8>>, Option<i64>)> {
        let Some(source) = source.filter(|_| !is_folder) else {
            return Ok((None, None));
        };
        let file_time = self.archive.entry_time(source)?;
        if self.imported_contents.contains(resource_id) {
            debug!(source, resource_id, "Content already imported for a sibling");
            return Ok((None, file_time));
        }
        match self.archive.read_entry(source)? {
            Some(bytes) => Ok((Some(bytes), file_time)),
            None => {
                self.report
                    .warning(&format!("archive entry {source} missing, importing empty content"));
                Ok((Some(Vec::new()), file_time))
            }
        }
    }

    fn apply_aces(&mut self, path: &str, aces: &[AceRecord]) -> Result<()> {
        let mut resolved = Vec::with_capacity(aces.len());
        for ace in aces {
            match self.repo.resolve_principal(&ace.principal)? {
                Some(id) => resolved.push(ace.resolve(id)),
                None => self.report.warning(&format!(
                    "{path}: access entry for unknown principal {} dropped",
                    ace.principal
                )),
            }
        }
        self.repo.write_aces(path, &resolved)
    }
}
