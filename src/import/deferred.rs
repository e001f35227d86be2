//! Deferred resolution graphs.
//!
//! Entities may name other entities that appear later in the manifest, or
//! not at all. Such references are parked here while the manifest is walked
//! and drained afterwards, each graph by its own resolve function. Whatever
//! is still unresolved at that point is reported and abandoned.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::resource::join_path;
use crate::model::{RelationRef, Resource};
use crate::report::{EntityStats, ReportSink};
use crate::repository::{Repository, ResourceFilter};

/// Relations waiting for both ends to exist.
///
/// Keyed by the sequence index of the declaring entry, since the source
/// may itself fail to import.
#[derive(Debug, Default)]
pub struct RelationGraph {
    pending: BTreeMap<usize, Vec<RelationRef>>,
}

impl RelationGraph {
    pub fn add(&mut self, relation: RelationRef) {
        self.pending
            .entry(relation.source_index)
            .or_default()
            .push(relation);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Create every relation whose source materialized and whose target can
    /// be found, by id first and by path second.
    ///
    /// `materialized` maps sequence indexes to the structure ids the entries
    /// were stored under. Relative target paths are tried against
    /// `base_path` when they do not resolve as given.
    ///
    /// # Errors
    ///
    /// Returns an error only if the repository cannot be queried.
    pub fn resolve(
        self,
        materialized: &BTreeMap<usize, String>,
        repo: &mut dyn Repository,
        base_path: &str,
        report: &mut dyn ReportSink,
    ) -> Result<EntityStats> {
        let mut stats = EntityStats::default();

        for (index, relations) in self.pending {
            let source = match materialized.get(&index) {
                Some(id) => repo.read_resource_by_id(id, ResourceFilter::ALL)?,
                None => None,
            };
            let Some(source) = source else {
                debug!(index, count = relations.len(), "Relation source was not imported");
                stats.skipped += relations.len();
                continue;
            };

            for relation in relations {
                let Some(target) = find_target(&*repo, &relation, base_path)? else {
                    warn!(
                        source = %source.path,
                        target = %relation.target_path,
                        "Relation target not found"
                    );
                    report.warning(&format!(
                        "relation {} from {} to {} not created: target not found",
                        relation.relation_type, source.path, relation.target_path
                    ));
                    stats.failed += 1;
                    continue;
                };
                match repo.add_relation(&source.path, &target.path, &relation.relation_type) {
                    Ok(()) => stats.created += 1,
                    Err(e) => {
                        warn!(source = %source.path, target = %target.path, error = %e, "Relation failed");
                        report.warning(&format!(
                            "relation {} from {} to {} failed: {e}",
                            relation.relation_type, source.path, target.path
                        ));
                        stats.failed += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}

fn find_target(
    repo: &dyn Repository,
    relation: &RelationRef,
    base_path: &str,
) -> Result<Option<Resource>> {
    if let Some(id) = &relation.target_id {
        if let Some(found) = repo.read_resource_by_id(id, ResourceFilter::ALL)? {
            return Ok(Some(found));
        }
    }
    if relation.target_path.is_empty() {
        return Ok(None);
    }
    if let Some(found) = repo.read_resource(&relation.target_path, ResourceFilter::ALL)? {
        return Ok(Some(found));
    }
    repo.read_resource(&join_path(base_path, &relation.target_path), ResourceFilter::ALL)
}

/// Group parents and memberships naming groups that do not exist yet.
#[derive(Debug, Default)]
pub struct GroupGraph {
    /// Parent group name to the children waiting for it.
    children: BTreeMap<String, Vec<String>>,
    /// Group name to the users waiting to join it.
    members: BTreeMap<String, Vec<String>>,
}

impl GroupGraph {
    pub fn defer_parent(&mut self, parent: &str, child: &str) {
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
    }

    pub fn defer_membership(&mut self, group: &str, user: &str) {
        self.members
            .entry(group.to_string())
            .or_default()
            .push(user.to_string());
    }

    /// Parent links and memberships still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.values().map(Vec::len).sum::<usize>()
            + self.members.values().map(Vec::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.members.is_empty()
    }

    /// Attach everything that was waiting for `group`, now that it exists.
    ///
    /// Failures are reported; the waiting entries are consumed either way.
    pub fn on_group_created(
        &mut self,
        group: &str,
        repo: &mut dyn Repository,
        report: &mut dyn ReportSink,
    ) {
        for child in self.children.remove(group).unwrap_or_default() {
            match repo.set_parent_group(&child, group) {
                Ok(()) => debug!(child = %child, parent = %group, "Deferred parent set"),
                Err(e) => {
                    warn!(child = %child, parent = %group, error = %e, "Deferred parent failed");
                    report.warning(&format!("could not set parent {group} of group {child}: {e}"));
                }
            }
        }
        for user in self.members.remove(group).unwrap_or_default() {
            match repo.add_user_to_group(&user, group) {
                Ok(()) => debug!(user = %user, group = %group, "Deferred membership added"),
                Err(e) => {
                    warn!(user = %user, group = %group, error = %e, "Deferred membership failed");
                    report.warning(&format!("could not add user {user} to group {group}: {e}"));
                }
            }
        }
    }

    /// Report whatever never found its group. Returns the number abandoned.
    pub fn resolve(self, report: &mut dyn ReportSink) -> usize {
        let mut abandoned = 0;
        for (parent, children) in self.children {
            for child in children {
                warn!(child = %child, parent = %parent, "Parent group never imported");
                report.warning(&format!(
                    "parent group {parent} of {child} does not exist; {child} stays without parent"
                ));
                abandoned += 1;
            }
        }
        for (group, users) in self.members {
            for user in users {
                warn!(user = %user, group = %group, "Group of membership never imported");
                report.warning(&format!("user {user} not added to missing group {group}"));
                abandoned += 1;
            }
        }
        abandoned
    }
}

/// An org unit whose resource set is reconciled after the resource pass.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrgUnitEntry {
    name: String,
    declared: Vec<String>,
    placeholder: Option<String>,
}

/// Org units waiting for their declared resources.
///
/// A unit must own one existing resource when it is created, but the
/// resources it declares are usually imported later. The unit is created
/// on a resource borrowed from its parent and fixed up here.
#[derive(Debug, Default)]
pub struct OrgUnitGraph {
    units: Vec<OrgUnitEntry>,
}

impl OrgUnitGraph {
    /// Remember a unit, with the resource it was created on if that is not
    /// one of its own.
    pub fn register(&mut self, name: &str, declared: Vec<String>, placeholder: Option<String>) {
        self.units.push(OrgUnitEntry {
            name: name.to_string(),
            declared,
            placeholder,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Add every declared resource that now exists and drop placeholders
    /// that are not part of the declared set. Returns the number of
    /// declared resources that never appeared.
    ///
    /// # Errors
    ///
    /// Returns an error only if the repository cannot be queried.
    pub fn resolve(self, repo: &mut dyn Repository, report: &mut dyn ReportSink) -> Result<usize> {
        let mut missing = 0;
        for unit in self.units {
            let mut attached = 0;
            for path in &unit.declared {
                if !repo.exists(path)? {
                    warn!(org_unit = %unit.name, path = %path, "Org unit resource missing");
                    report.warning(&format!(
                        "resource {path} of org unit {} does not exist",
                        unit.name
                    ));
                    missing += 1;
                    continue;
                }
                match repo.add_resource_to_org_unit(&unit.name, path) {
                    Ok(()) => attached += 1,
                    Err(e) => report.warning(&format!(
                        "could not add {path} to org unit {}: {e}",
                        unit.name
                    )),
                }
            }

            if let Some(placeholder) = unit.placeholder {
                if attached == 0 {
                    // Removing the placeholder would leave the unit empty.
                    report.warning(&format!(
                        "org unit {} keeps placeholder resource {placeholder}",
                        unit.name
                    ));
                } else if !unit.declared.contains(&placeholder) {
                    if let Err(e) = repo.remove_resource_from_org_unit(&unit.name, &placeholder) {
                        report.warning(&format!(
                            "could not remove placeholder {placeholder} from org unit {}: {e}",
                            unit.name
                        ));
                    }
                }
            }
        }
        Ok(missing)
    }
}
