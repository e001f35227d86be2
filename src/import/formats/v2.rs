//! Version 2, the oldest dialect still read.
//!
//! Dates are millisecond counts and only the last-modified date is written.
//! There are no ids, so every entry becomes a fresh resource. Access
//! entries name their principal bare and tell users from groups by flag
//! bits. Properties have no shared values.

use super::{
    Handler, ImportFormat, Reading, ace_allowed, ace_denied, ace_enter, ace_flags, ace_leave_with,
    ace_principal, date_millis, file_destination, file_enter, file_flags, file_leave,
    file_source, file_type, group_description, group_enter, group_flags, group_leave,
    group_name, group_parent, on_file, property_leave, property_name, property_value,
    user_created_millis, user_email, user_enter, user_firstname, user_flags, user_group,
    user_lastname, user_leave, user_name, user_password,
};
use crate::error::Result;
use crate::import::accumulator::PropertyDraft;
use crate::import::accumulator::date_field::LAST_MODIFIED;
use crate::manifest::{Element, Rule};
use crate::model::PrincipalRef;

#[derive(Debug, Default, Clone, Copy)]
pub struct V2;

fn ace_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    ace_leave_with(s, PrincipalRef::from_legacy)
}

fn property_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    on_file(s, |f| f.property = Some(PropertyDraft::default()))
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
    Rule::leave("export/usergroupdata/userdata/datecreated", user_created_millis),
    Rule::leave("export/usergroupdata/userdata/usergroups/usergroup", user_group),
    // files
    Rule::entity("export/files/file", file_enter, file_leave),
    Rule::leave("export/files/file/source", file_source),
    Rule::leave("export/files/file/destination", file_destination),
    Rule::leave("export/files/file/type", file_type),
    Rule::leave("export/files/file/lastmodified", date_millis::<LAST_MODIFIED>),
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
];

impl ImportFormat for V2 {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &'static str {
        "v2"
    }

    fn rules(&self) -> &'static [Rule<Handler>] {
        RULES
    }
}
