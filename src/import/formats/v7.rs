//! Version 7: accounts grouped by org unit, relations, role principals.

use super::{
    Handler, ImportFormat, Reading, ace_allowed, ace_denied, ace_enter, ace_flags, ace_leave_with,
    ace_principal, date_rfc1123, decode_prefixed, file_destination, file_enter, file_flags,
    file_leave, file_resource_id, file_source, file_structure_id, file_type, file_user_created,
    file_user_last_modified, group_description, group_enter, group_flags, group_leave, group_name,
    group_parent, org_unit_description, org_unit_enter, org_unit_flags, org_unit_leave,
    org_unit_members, org_unit_name, org_unit_resource, project_description, project_enter,
    project_leave, project_managers, project_name, project_resource, project_users,
    property_enter, property_leave, property_name, property_value, relation_enter, relation_id,
    relation_leave, relation_path, relation_type, user_created_rfc1123, user_email, user_enter,
    user_firstname, user_flags, user_group, user_info_text, user_lastname, user_leave, user_name,
    user_password, user_role,
};
use crate::error::Result;
use crate::import::accumulator::date_field::{CREATED, EXPIRED, LAST_MODIFIED, RELEASED};
use crate::manifest::{Element, Rule};
use crate::model::acl::ace_flags::{GROUP, ROLE, USER};

#[derive(Debug, Default, Clone, Copy)]
pub struct V7;

fn ace_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    ace_leave_with(s, |raw, _| decode_prefixed(raw, GROUP | USER | ROLE))
}

const RULES: &[Rule<Handler>] = &[
    // accounts
    Rule::entity("export/accounts/orgunits/orgunit", org_unit_enter, org_unit_leave),
    Rule::leave("export/accounts/orgunits/orgunit/name", org_unit_name),
    Rule::leave("export/accounts/orgunits/orgunit/description", org_unit_description),
    Rule::leave("export/accounts/orgunits/orgunit/flags", org_unit_flags),
    Rule::leave("export/accounts/orgunits/orgunit/resources/resource", org_unit_resource),
    Rule::enter("export/accounts/orgunits/orgunit/groups", org_unit_members),
    Rule::entity("export/accounts/orgunits/orgunit/groups/group", group_enter, group_leave),
    Rule::leave("export/accounts/orgunits/orgunit/groups/group/name", group_name),
    Rule::leave("export/accounts/orgunits/orgunit/groups/group/description", group_description),
    Rule::leave("export/accounts/orgunits/orgunit/groups/group/flags", group_flags),
    Rule::leave("export/accounts/orgunits/orgunit/groups/group/parentgroup", group_parent),
    Rule::enter("export/accounts/orgunits/orgunit/users", org_unit_members),
    Rule::entity("export/accounts/orgunits/orgunit/users/user", user_enter, user_leave),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/name", user_name),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/password", user_password),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/firstname", user_firstname),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/lastname", user_lastname),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/email", user_email),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/flags", user_flags),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/datecreated", user_created_rfc1123),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/userinfo/entry", user_info_text),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/userroles/userrole", user_role),
    Rule::leave("export/accounts/orgunits/orgunit/users/user/usergroups/usergroup", user_group),
    // files
    Rule::entity("export/files/file", file_enter, file_leave),
    Rule::leave("export/files/file/source", file_source),
    Rule::leave("export/files/file/destination", file_destination),
    Rule::leave("export/files/file/type", file_type),
    Rule::leave("export/files/file/uuidstructure", file_structure_id),
    Rule::leave("export/files/file/uuidresource", file_resource_id),
    Rule::leave("export/files/file/datelastmodified", date_rfc1123::<LAST_MODIFIED>),
    Rule::leave("export/files/file/userlastmodified", file_user_last_modified),
    Rule::leave("export/files/file/datecreated", date_rfc1123::<CREATED>),
    Rule::leave("export/files/file/usercreated", file_user_created),
    Rule::leave("export/files/file/datereleased", date_rfc1123::<RELEASED>),
    Rule::leave("export/files/file/dateexpired", date_rfc1123::<EXPIRED>),
    Rule::leave("export/files/file/flags", file_flags),
    Rule::entity("export/files/file/properties/property", property_enter, property_leave),
    Rule::leave("export/files/file/properties/property/name", property_name),
    Rule::leave("export/files/file/properties/property/value", property_value),
    Rule::entity("export/files/file/relations/relation", relation_enter, relation_leave),
    Rule::leave("export/files/file/relations/relation/id", relation_id),
    Rule::leave("export/files/file/relations/relation/path", relation_path),
    Rule::leave("export/files/file/relations/relation/type", relation_type),
    Rule::entity("export/files/file/accesscontrol/accessentry", ace_enter, ace_leave),
    Rule::leave("export/files/file/accesscontrol/accessentry/uuidprincipal", ace_principal),
    Rule::leave("export/files/file/accesscontrol/accessentry/flags", ace_flags),
    Rule::leave(
        "export/files/file/accesscontrol/accessentry/permissionset/allowed",
        ace_allowed,
    ),
    Rule::leave(
        "export/files/file/accesscontrol/accessentry/permissionset/denied",
        ace_denied,
    ),
    // projects
    Rule::entity("export/projects/project", project_enter, project_leave),
    Rule::leave("export/projects/project/name", project_name),
    Rule::leave("export/projects/project/description", project_description),
    Rule::leave("export/projects/project/managersgroup", project_managers),
    Rule::leave("export/projects/project/usersgroup", project_users),
    Rule::leave("export/projects/project/resources/resource", project_resource),
];

impl ImportFormat for V7 {
    fn version(&self) -> u32 {
        7
    }

    fn name(&self) -> &'static str {
        "v7"
    }

    fn rules(&self) -> &'static [Rule<Handler>] {
        RULES
    }
}
