//! Account and project sections of an export.
//!
//! Org units come out parent first, each carrying its groups and users, so
//! an import can create them in document order.

use std::io::Write;

use tracing::debug;

use super::Exporter;
use crate::error::Result;
use crate::manifest::dates::format_date;
use crate::manifest::{
    A_NAME, A_TYPE, ManifestWriter, N_ACCOUNTS, N_DATECREATED, N_DESCRIPTION, N_EMAIL, N_ENTRY,
    N_FIRSTNAME, N_FLAGS, N_GROUP, N_GROUPS, N_LASTNAME, N_MANAGERSGROUP, N_NAME, N_ORGUNIT,
    N_ORGUNITS, N_PARENTGROUP, N_PASSWORD, N_PROJECT, N_PROJECTS, N_RESOURCE, N_RESOURCES,
    N_USER, N_USERGROUP, N_USERGROUPS, N_USERINFO, N_USERROLE, N_USERROLES, N_USERS,
    N_USERSGROUP, Node,
};
use crate::model::project::ONLINE_PROJECT;
use crate::model::{Group, OrgUnit, Project, User};

fn resources_node(paths: &[String]) -> Node {
    let mut node = Node::new(N_RESOURCES);
    for path in paths {
        node.push_leaf(N_RESOURCE, path.as_str());
    }
    node
}

fn group_node(group: &Group) -> Node {
    let mut node = Node::new(N_GROUP)
        .child(Node::leaf(N_NAME, group.name.as_str()))
        .child(Node::leaf(N_DESCRIPTION, group.description.as_str()))
        .child(Node::leaf(N_FLAGS, group.flags.to_string()));
    if let Some(parent) = &group.parent {
        node.push_leaf(N_PARENTGROUP, parent.as_str());
    }
    node
}

fn user_node(user: &User) -> Node {
    let mut node = Node::new(N_USER)
        .child(Node::leaf(N_NAME, user.name.as_str()))
        .child(Node::leaf(N_PASSWORD, user.password.as_str()))
        .child(Node::leaf(N_FIRSTNAME, user.firstname.as_str()))
        .child(Node::leaf(N_LASTNAME, user.lastname.as_str()))
        .child(Node::leaf(N_EMAIL, user.email.as_str()))
        .child(Node::leaf(N_FLAGS, user.flags.to_string()))
        .child(Node::leaf(N_DATECREATED, format_date(user.date_created)));

    let mut info = Node::new(N_USERINFO);
    for (name, value) in &user.info {
        info.push(
            Node::leaf(N_ENTRY, value.raw())
                .attr(A_NAME, name.as_str())
                .attr(A_TYPE, value.type_name()),
        );
    }
    node.push_nonempty(info);

    let mut roles = Node::new(N_USERROLES);
    for role in &user.roles {
        roles.push_leaf(N_USERROLE, role.as_str());
    }
    node.push_nonempty(roles);

    let mut groups = Node::new(N_USERGROUPS);
    for group in &user.groups {
        groups.push_leaf(N_USERGROUP, group.as_str());
    }
    node.push_nonempty(groups);
    node
}

fn project_node(project: &Project) -> Node {
    Node::new(N_PROJECT)
        .child(Node::leaf(N_NAME, project.name.as_str()))
        .child(Node::leaf(N_DESCRIPTION, project.description.as_str()))
        .child(Node::leaf(N_MANAGERSGROUP, project.managers_group.as_str()))
        .child(Node::leaf(N_USERSGROUP, project.users_group.as_str()))
        .child(resources_node(&project.resources))
}

impl Exporter<'_> {
    pub(super) fn write_accounts<W: Write>(&mut self, manifest: &mut ManifestWriter<W>) -> Result<()> {
        manifest.open(N_ACCOUNTS)?;
        manifest.open(N_ORGUNITS)?;
        for unit in self.repo.read_org_units()? {
            self.write_org_unit(manifest, &unit)?;
        }
        manifest.close()?;
        manifest.close()
    }

    fn write_org_unit<W: Write>(&mut self, manifest: &mut ManifestWriter<W>, unit: &OrgUnit) -> Result<()> {
        manifest.open(N_ORGUNIT)?;
        manifest.write(&Node::leaf(N_NAME, unit.name.as_str()))?;
        manifest.write(&Node::leaf(N_DESCRIPTION, unit.description.as_str()))?;
        manifest.write(&Node::leaf(N_FLAGS, unit.flags.to_string()))?;
        manifest.write(&resources_node(&unit.resources))?;
        self.stats.org_units += 1;

        manifest.open(N_GROUPS)?;
        for group in self.repo.read_groups(&unit.name)? {
            manifest.write(&group_node(&group))?;
            self.stats.groups += 1;
        }
        manifest.close()?;

        manifest.open(N_USERS)?;
        for user in self.repo.read_users(&unit.name)? {
            manifest.write(&user_node(&user))?;
            self.stats.users += 1;
        }
        manifest.close()?;

        debug!(org_unit = %unit.name, "Exported org unit");
        manifest.close()
    }

    /// Every project but the online one, which always exists.
    pub(super) fn write_projects<W: Write>(&mut self, manifest: &mut ManifestWriter<W>) -> Result<()> {
        manifest.open(N_PROJECTS)?;
        for project in self.repo.read_projects()? {
            if project.name == ONLINE_PROJECT {
                continue;
            }
            manifest.write(&project_node(&project))?;
            self.stats.projects += 1;
        }
        manifest.close()
    }
}
