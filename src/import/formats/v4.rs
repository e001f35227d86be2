//! Version 4: structure and resource ids, RFC 1123 dates, flat account data.

use super::{
    Handler, ImportFormat, Reading, ace_allowed, ace_denied, ace_enter, ace_flags, ace_leave_with,
    ace_principal, date_rfc1123, decode_prefixed, file_destination, file_enter, file_flags,
    file_leave, file_resource_id, file_source, file_structure_id, file_type, file_user_created,
    file_user_last_modified, group_description, group_enter, group_flags, group_leave, group_name,
    group_parent, project_description, project_enter, project_leave, project_managers,
    project_name, project_resource, project_users, property_enter, property_leave, property_name,
    property_value, user_created_rfc1123, user_email, user_enter, user_firstname, user_flags,
    user_group, user_lastname, user_leave, user_name, user_password,
};
use crate::error::Result;
use crate::import::accumulator::date_field::{CREATED, EXPIRED, LAST_MODIFIED, RELEASED};
use crate::manifest::{Element, Rule};
use crate::model::acl::ace_flags::{GROUP, USER};

#[derive(Debug, Default, Clone, Copy)]
pub struct V4;

fn ace_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    ace_leave_with(s, |raw, _| decode_prefixed(raw, GROUP | USER))
}

const RULES: &[Rule<Handler>] = &[
    // accounts
    Rule::entity("export/usergroupdata/groupdata", group_enter, group_leave),
    Rule::leave("export/usergroupdata/groupdata/name", group_name),
    Rule::leave("export/usergroupdata/groupdata/description", group_description),
    Rule::leave("export/usergroupdata/groupdata/flags", group_flags),
    Rule::leave("export/usergroupdata/groupdata/parentgroup", group_parent),
    Rule::entity("export/usergroupdata/userdata", user_enter, user_leave),
    Rule::leave("export/usergroupdata/userdata/name", user_name),
    Rule::leave("export/usergroupdata/userdata/password", user_password),
    Rule::leave("export/usergroupdata/userdata/firstname", user_firstname),
    Rule::leave("export/usergroupdata/userdata/lastname", user_lastname),
    Rule::leave("export/usergroupdata/userdata/email", user_email),
    Rule::leave("export/usergroupdata/userdata/flags", user_flags),
    Rule::leave("export/usergroupdata/userdata/datecreated", user_created_rfc1123),
    Rule::leave("export/usergroupdata/userdata/usergroups/usergroup", user_group),
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

impl ImportFormat for V4 {
    fn version(&self) -> u32 {
        4
    }

    fn name(&self) -> &'static str {
        "v4"
    }

    fn rules(&self) -> &'static [Rule<Handler>] {
        RULES
    }
}
