//! Builds users, groups, org units and projects from their accumulators.

use tracing::debug;

use super::accumulator::{
    GroupAccumulator, OrgUnitAccumulator, ProjectAccumulator, UserAccumulator,
};
use super::builder::Outcome;
use super::session::ImportSession;
use crate::error::{Error, Result};
use crate::model::principal::{normalize_org_unit, parent_org_unit};
use crate::model::{Group, OrgUnit, PrincipalRecord, Project, User};
use crate::report::EntityStats;

impl ImportSession<'_> {
    fn principal_stats(&mut self, kind: &str) -> &mut EntityStats {
        match kind {
            "user" => &mut self.stats.users,
            "group" => &mut self.stats.groups,
            "org unit" => &mut self.stats.org_units,
            _ => &mut self.stats.projects,
        }
    }

    fn principal_failed(&mut self, kind: &str, name: &str, reason: &str) {
        self.entity_failed(kind, name, reason);
        self.principal_stats(kind).failed += 1;
    }

    /// Store one account entity and count the outcome. Failures are
    /// reported and never abort the import.
    fn persist_principal(&mut self, record: PrincipalRecord) {
        let kind = record.kind();
        let name = record.name().to_string();
        let result = match record {
            PrincipalRecord::User(user) => self.store_user(user),
            PrincipalRecord::Group(group) => self.store_group(group),
            PrincipalRecord::OrgUnit(unit) => self.store_org_unit(unit),
            PrincipalRecord::Project(project) => self.store_project(project),
        };
        match result {
            Ok(outcome) => outcome.count(self.principal_stats(kind)),
            Err(e) => self.principal_failed(kind, &name, &e.to_string()),
        }
    }

    /// Create the org unit being read, once. Called when its groups or users
    /// start, so they find their unit, and again when the unit closes.
    pub(crate) fn build_org_unit(&mut self, acc: &mut OrgUnitAccumulator) {
        if acc.built {
            return;
        }
        acc.built = true;

        let unit = OrgUnit {
            name: normalize_org_unit(&acc.name),
            description: acc.description.clone(),
            flags: acc.flags,
            resources: acc.resources.clone(),
        };
        match acc.pending.error() {
            Some(reason) => {
                let reason = reason.to_string();
                self.principal_failed("org unit", &unit.name, &reason);
            }
            None => self.persist_principal(PrincipalRecord::OrgUnit(unit)),
        }
    }

    fn store_org_unit(&mut self, unit: OrgUnit) -> Result<Outcome> {
        if self.repo.read_org_unit(&unit.name)?.is_some() {
            debug!(name = %unit.name, "Org unit exists");
            self.org_units.register(&unit.name, unit.resources, None);
            return Ok(Outcome::Skipped);
        }

        let mut initial = None;
        for path in &unit.resources {
            if self.repo.exists(path)? {
                initial = Some(path.clone());
                break;
            }
        }

        let placeholder = match initial {
            Some(_) => None,
            None => {
                let parent = parent_org_unit(&unit.name)
                    .ok_or_else(|| Error::Other("the root org unit cannot be created".into()))?;
                let parent_unit = self
                    .repo
                    .read_org_unit(&parent)?
                    .ok_or(Error::PrincipalNotFound { name: parent })?;
                parent_unit.resources.into_iter().next()
            }
        };
        let start = initial
            .or_else(|| placeholder.clone())
            .ok_or_else(|| Error::ResourceNotFound {
                path: format!("any resource for org unit {}", unit.name),
            })?;

        self.repo.create_org_unit(&unit, &start)?;
        debug!(name = %unit.name, start = %start, "Created org unit");
        self.org_units.register(&unit.name, unit.resources, placeholder);
        Ok(Outcome::Created)
    }

    /// Build the group that just closed inside `org_unit`.
    pub(crate) fn build_group(&mut self, acc: GroupAccumulator, org_unit: String) {
        if let Some(reason) = acc.pending.error() {
            let reason = reason.to_string();
            self.principal_failed("group", &acc.name, &reason);
            return;
        }

        let group = Group {
            id: String::new(),
            name: acc.name,
            description: acc.description,
            flags: acc.flags,
            parent: acc.parent.filter(|p| !p.is_empty()),
            org_unit,
        };
        self.persist_principal(PrincipalRecord::Group(group));
    }

    fn store_group(&mut self, mut group: Group) -> Result<Outcome> {
        if group.name.is_empty() {
            return Err(Error::InvalidValue {
                field: "name",
                value: String::new(),
            });
        }
        if self.repo.read_group(&group.name)?.is_some() {
            debug!(name = %group.name, "Group exists");
            return Ok(Outcome::Skipped);
        }

        if let Some(parent) = group.parent.take() {
            if self.repo.read_group(&parent)?.is_some() {
                group.parent = Some(parent);
            } else {
                debug!(group = %group.name, parent = %parent, "Deferring parent group");
                self.groups.defer_parent(&parent, &group.name);
            }
        }

        self.repo.create_group(&group)?;
        debug!(name = %group.name, "Created group");
        self.groups
            .on_group_created(&group.name, &mut *self.repo, &mut *self.report);
        Ok(Outcome::Created)
    }

    /// Build the user that just closed inside `org_unit`.
    pub(crate) fn build_user(&mut self, acc: UserAccumulator, org_unit: String) {
        if let Some(reason) = acc.pending.error() {
            let reason = reason.to_string();
            self.principal_failed("user", &acc.name, &reason);
            return;
        }

        let user = User {
            id: String::new(),
            name: acc.name,
            password: acc.password,
            firstname: acc.firstname,
            lastname: acc.lastname,
            email: acc.email,
            flags: acc.flags,
            date_created: acc.date_created.unwrap_or(self.import_time),
            info: acc.info,
            org_unit,
            groups: acc.groups,
            roles: acc.roles,
        };
        self.persist_principal(PrincipalRecord::User(user));
    }

    fn store_user(&mut self, user: User) -> Result<Outcome> {
        if user.name.is_empty() {
            return Err(Error::InvalidValue {
                field: "name",
                value: String::new(),
            });
        }
        if self.repo.read_user(&user.name)?.is_some() {
            debug!(name = %user.name, "User exists");
            return Ok(Outcome::Skipped);
        }

        self.repo.create_user(&user)?;
        debug!(name = %user.name, "Created user");

        for group in &user.groups {
            if self.repo.read_group(group)?.is_none() {
                debug!(user = %user.name, group = %group, "Deferring membership");
                self.groups.defer_membership(group, &user.name);
            } else if let Err(e) = self.repo.add_user_to_group(&user.name, group) {
                self.report
                    .warning(&format!("could not add user {} to group {group}: {e}", user.name));
            }
        }
        for role in &user.roles {
            if let Err(e) = self.repo.add_user_to_role(&user.name, role) {
                self.report
                    .warning(&format!("could not give user {} role {role}: {e}", user.name));
            }
        }
        Ok(Outcome::Created)
    }

    /// Build the project that just closed.
    pub(crate) fn build_project(&mut self, acc: ProjectAccumulator) {
        if let Some(reason) = acc.pending.error() {
            let reason = reason.to_string();
            self.principal_failed("project", &acc.name, &reason);
            return;
        }

        let project = Project {
            id: String::new(),
            name: acc.name,
            description: acc.description,
            users_group: acc.users_group,
            managers_group: acc.managers_group,
            resources: acc.resources,
            created_at: 0,
        };
        self.persist_principal(PrincipalRecord::Project(project));
    }

    fn store_project(&mut self, project: Project) -> Result<Outcome> {
        if self.repo.read_project(&project.name)?.is_some() {
            debug!(name = %project.name, "Project exists");
            return Ok(Outcome::Skipped);
        }
        self.repo.create_project(&project)?;
        for path in &project.resources {
            if !self.repo.exists(path)? {
                self.report.warning(&format!(
                    "resource {path} of project {} does not exist",
                    project.name
                ));
                continue;
            }
            self.repo.add_resource_to_project(&project.name, path)?;
        }
        debug!(name = %project.name, "Created project");
        Ok(Outcome::Created)
    }
}
