//! Manifest dialects.
//!
//! Each supported manifest version is an [`ImportFormat`] with its own
//! static rule table. Tables share the element handlers defined here; what
//! differs between versions is which paths exist, how dates are written
//! and which principal classes an access entry may name.
//!
//! # Dialects
//!
//! - [`v10`] - current dialect, date macros and typed user info
//! - [`v7`] - accounts grouped by org unit, relations
//! - [`v4`] - structure and resource ids, RFC 1123 dates
//! - [`v2`] - millisecond dates, legacy principals and account layout

pub mod v10;
pub mod v2;
pub mod v4;
pub mod v7;

use std::io::BufRead;

use super::accumulator::{
    AceDraft, FileAccumulator, GroupAccumulator, OrgUnitAccumulator, ProjectAccumulator,
    PropertyDraft, RelationDecl, UserAccumulator, parse_u32,
};
use super::registry::ManifestInfo;
use super::session::ImportSession;
use crate::error::{Error, Result};
use crate::manifest::dates::{parse_date, parse_date_value, parse_millis};
use crate::manifest::{A_NAME, A_TYPE, Element, N_EXPORT, Rule, V_SHARED, walk};
use crate::model::principal::{ROOT_ORG_UNIT, normalize_org_unit};
use crate::model::resource::join_path;
use crate::model::{DateValue, InfoValue, PrincipalRef};

pub use v2::V2;
pub use v4::V4;
pub use v7::V7;
pub use v10::V10;

/// Element handler over the state of a manifest walk.
pub type Handler = fn(&mut Reading<'_, '_>, &Element) -> Result<()>;

/// Decodes the principal of an access entry from its raw text and flags.
pub type PrincipalDecoder = fn(&str, u32) -> Result<PrincipalRef>;

/// A manifest dialect the importer understands.
pub trait ImportFormat: Send + Sync {
    /// The `export_version` this dialect reads.
    fn version(&self) -> u32;

    /// Short human-readable name.
    fn name(&self) -> &'static str;

    /// The rule table driving the walk.
    fn rules(&self) -> &'static [Rule<Handler>];

    /// Whether this dialect claims a manifest with the given header.
    fn matches(&self, info: &ManifestInfo) -> bool {
        info.root == N_EXPORT && info.version == self.version()
    }

    /// Walk a whole manifest, building entities as they close.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is not well-formed. Problems with
    /// single entities are reported through the session instead.
    fn import(&self, manifest: Box<dyn BufRead>, session: &mut ImportSession<'_>) -> Result<()> {
        let mut reading = Reading::new(session);
        walk(manifest, self.rules(), |handler, element| {
            handler(&mut reading, element)
        })
    }
}

/// The entities a manifest walk has open.
///
/// An accumulator lives from its element's start to its end, where it is
/// moved into the session to be built and stored. Whatever is still open
/// when a walk fails is dropped with it.
pub struct Reading<'s, 'a> {
    session: &'s mut ImportSession<'a>,
    file: Option<FileAccumulator>,
    user: Option<UserAccumulator>,
    group: Option<GroupAccumulator>,
    org_unit: Option<OrgUnitAccumulator>,
    project: Option<ProjectAccumulator>,
}

impl<'s, 'a> Reading<'s, 'a> {
    fn new(session: &'s mut ImportSession<'a>) -> Self {
        Self {
            session,
            file: None,
            user: None,
            group: None,
            org_unit: None,
            project: None,
        }
    }

    /// Org unit that nested users and groups belong to.
    fn org_unit_name(&self) -> String {
        self.org_unit
            .as_ref()
            .map_or_else(|| ROOT_ORG_UNIT.to_string(), |unit| normalize_org_unit(&unit.name))
    }
}

fn text(e: &Element) -> String {
    e.text().to_string()
}

fn non_empty(e: &Element) -> Option<String> {
    let t = e.text();
    (!t.is_empty()).then(|| t.to_string())
}

/// Org unit and project resources are repository paths, absolute or not.
fn resource_path(e: &Element) -> Option<String> {
    non_empty(e).map(|p| join_path("/", &p))
}

fn on_file(s: &mut Reading<'_, '_>, f: impl FnOnce(&mut FileAccumulator)) -> Result<()> {
    if let Some(file) = s.file.as_mut() {
        f(file);
    }
    Ok(())
}

fn on_user(s: &mut Reading<'_, '_>, f: impl FnOnce(&mut UserAccumulator)) -> Result<()> {
    if let Some(user) = s.user.as_mut() {
        f(user);
    }
    Ok(())
}

fn on_group(s: &mut Reading<'_, '_>, f: impl FnOnce(&mut GroupAccumulator)) -> Result<()> {
    if let Some(group) = s.group.as_mut() {
        f(group);
    }
    Ok(())
}

fn on_org_unit(s: &mut Reading<'_, '_>, f: impl FnOnce(&mut OrgUnitAccumulator)) -> Result<()> {
    if let Some(unit) = s.org_unit.as_mut() {
        f(unit);
    }
    Ok(())
}

fn on_project(s: &mut Reading<'_, '_>, f: impl FnOnce(&mut ProjectAccumulator)) -> Result<()> {
    if let Some(project) = s.project.as_mut() {
        f(project);
    }
    Ok(())
}

// ── Files ───────────────────────────────────────────────────

pub(crate) fn file_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    s.file = Some(FileAccumulator::default());
    Ok(())
}

pub(crate) fn file_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    if let Some(file) = s.file.take() {
        s.session.build_file(file);
    }
    Ok(())
}

pub(crate) fn file_source(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.source = non_empty(e))
}

pub(crate) fn file_destination(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.destination = Some(text(e)))
}

pub(crate) fn file_type(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.type_name = non_empty(e))
}

pub(crate) fn file_structure_id(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.structure_id = non_empty(e))
}

pub(crate) fn file_resource_id(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.resource_id = non_empty(e))
}

pub(crate) fn file_user_created(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.user_created = non_empty(e))
}

pub(crate) fn file_user_last_modified(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.user_last_modified = non_empty(e))
}

pub(crate) fn file_flags(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.flags = parse_u32(&mut f.pending, "flags", e.text()))
}

/// A date written as RFC 1123 text.
pub(crate) fn date_rfc1123<const FIELD: u8>(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.set_date(FIELD, parse_date(e.text()).map(DateValue::At)))
}

/// A date that may also be `${FILETIME}` or `${IMPORTTIME}`.
pub(crate) fn date_with_macros<const FIELD: u8>(
    s: &mut Reading<'_, '_>,
    e: &Element,
) -> Result<()> {
    on_file(s, |f| f.set_date(FIELD, parse_date_value(e.text())))
}

/// A date written as milliseconds since the epoch.
pub(crate) fn date_millis<const FIELD: u8>(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| f.set_date(FIELD, parse_millis(e.text()).map(DateValue::At)))
}

pub(crate) fn property_enter(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    let shared = e.attr(A_TYPE) == Some(V_SHARED);
    on_file(s, |f| {
        f.property = Some(PropertyDraft {
            shared,
            ..PropertyDraft::default()
        });
    })
}

pub(crate) fn property_name(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(p) = f.property.as_mut() {
            p.name = text(e);
        }
    })
}

pub(crate) fn property_value(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(p) = f.property.as_mut() {
            p.value = text(e);
        }
    })
}

pub(crate) fn property_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(p) = f.property.take().filter(|p| !p.name.is_empty()) {
            f.properties.push(p.build());
        }
    })
}

pub(crate) fn relation_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    on_file(s, |f| f.relation = Some(RelationDecl::default()))
}

pub(crate) fn relation_id(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(r) = f.relation.as_mut() {
            r.id = non_empty(e);
        }
    })
}

pub(crate) fn relation_path(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(r) = f.relation.as_mut() {
            r.path = text(e);
        }
    })
}

pub(crate) fn relation_type(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(r) = f.relation.as_mut() {
            r.relation_type = text(e);
        }
    })
}

pub(crate) fn relation_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(r) = f.relation.take() {
            f.relations.push(r);
        }
    })
}

pub(crate) fn ace_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    on_file(s, |f| f.ace = Some(AceDraft::default()))
}

pub(crate) fn ace_principal(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(a) = f.ace.as_mut() {
            a.principal = text(e);
        }
    })
}

pub(crate) fn ace_flags(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(a) = f.ace.as_mut() {
            a.flags = parse_u32(&mut f.pending, "access flags", e.text());
        }
    })
}

pub(crate) fn ace_allowed(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(a) = f.ace.as_mut() {
            a.allowed = parse_u32(&mut f.pending, "allowed permissions", e.text());
        }
    })
}

pub(crate) fn ace_denied(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_file(s, |f| {
        if let Some(a) = f.ace.as_mut() {
            a.denied = parse_u32(&mut f.pending, "denied permissions", e.text());
        }
    })
}

/// Close an access entry, decoding its principal the dialect's way.
///
/// An entry whose principal does not decode is dropped with a warning; the
/// rest of the file still imports.
pub(crate) fn ace_leave_with(s: &mut Reading<'_, '_>, decode: PrincipalDecoder) -> Result<()> {
    let Some(file) = s.file.as_mut() else {
        return Ok(());
    };
    let Some(draft) = file.ace.take() else {
        return Ok(());
    };
    match decode(&draft.principal, draft.flags) {
        Ok(principal) => file.aces.push(draft.build(principal)),
        Err(e) => {
            let label = file.destination.as_deref().unwrap_or("?");
            s.session
                .report
                .warning(&format!("{label}: access entry dropped: {e}"));
        }
    }
    Ok(())
}

/// Principal written with a class prefix, limited to the given classes.
pub(crate) fn decode_prefixed(raw: &str, allowed: u32) -> Result<PrincipalRef> {
    let principal: PrincipalRef = raw.parse()?;
    if principal.class_flag() & allowed == 0 {
        return Err(Error::InvalidValue {
            field: "principal",
            value: raw.to_string(),
        });
    }
    Ok(principal)
}

// ── Groups ──────────────────────────────────────────────────

pub(crate) fn group_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    s.group = Some(GroupAccumulator::default());
    Ok(())
}

pub(crate) fn group_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    let org_unit = s.org_unit_name();
    if let Some(group) = s.group.take() {
        s.session.build_group(group, org_unit);
    }
    Ok(())
}

pub(crate) fn group_name(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_group(s, |g| g.name = text(e))
}

pub(crate) fn group_description(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_group(s, |g| g.description = text(e))
}

pub(crate) fn group_flags(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_group(s, |g| g.flags = parse_u32(&mut g.pending, "flags", e.text()))
}

pub(crate) fn group_parent(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_group(s, |g| g.parent = non_empty(e))
}

// ── Users ───────────────────────────────────────────────────

pub(crate) fn user_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    s.user = Some(UserAccumulator::default());
    Ok(())
}

pub(crate) fn user_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    let org_unit = s.org_unit_name();
    if let Some(user) = s.user.take() {
        s.session.build_user(user, org_unit);
    }
    Ok(())
}

pub(crate) fn user_name(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.name = text(e))
}

pub(crate) fn user_password(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.password = text(e))
}

pub(crate) fn user_firstname(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.firstname = text(e))
}

pub(crate) fn user_lastname(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.lastname = text(e))
}

pub(crate) fn user_email(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.email = text(e))
}

pub(crate) fn user_flags(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.flags = parse_u32(&mut u.pending, "flags", e.text()))
}

pub(crate) fn user_created_rfc1123(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| match parse_date(e.text()) {
        Ok(at) => u.date_created = Some(at),
        Err(err) => u.pending.fail(err.to_string()),
    })
}

pub(crate) fn user_created_millis(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| match parse_millis(e.text()) {
        Ok(at) => u.date_created = Some(at),
        Err(err) => u.pending.fail(err.to_string()),
    })
}

/// A `userinfo/entry` without a declared type; the value is kept as text.
pub(crate) fn user_info_text(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| match e.attr(A_NAME).filter(|n| !n.is_empty()) {
        Some(name) => {
            u.info.insert(name.to_string(), InfoValue::Text(text(e)));
        }
        None => u.pending.fail("user info entry without name"),
    })
}

/// A `userinfo/entry` carrying its value type in the `type` attribute.
pub(crate) fn user_info_typed(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| {
        let Some(name) = e.attr(A_NAME).filter(|n| !n.is_empty()) else {
            u.pending.fail("user info entry without name");
            return;
        };
        match InfoValue::parse(e.attr(A_TYPE).unwrap_or_default(), e.text()) {
            Ok(value) => {
                u.info.insert(name.to_string(), value);
            }
            Err(err) => u.pending.fail(err.to_string()),
        }
    })
}

pub(crate) fn user_role(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.roles.extend(non_empty(e)))
}

pub(crate) fn user_group(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_user(s, |u| u.groups.extend(non_empty(e)))
}

// ── Org units ───────────────────────────────────────────────

pub(crate) fn org_unit_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    s.org_unit = Some(OrgUnitAccumulator::default());
    Ok(())
}

pub(crate) fn org_unit_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    if let Some(mut unit) = s.org_unit.take() {
        s.session.build_org_unit(&mut unit);
    }
    Ok(())
}

/// The unit's groups or users start; the unit itself must exist by now.
pub(crate) fn org_unit_members(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    if let Some(unit) = s.org_unit.as_mut() {
        s.session.build_org_unit(unit);
    }
    Ok(())
}

pub(crate) fn org_unit_name(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_org_unit(s, |o| o.name = text(e))
}

pub(crate) fn org_unit_description(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_org_unit(s, |o| o.description = text(e))
}

pub(crate) fn org_unit_flags(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_org_unit(s, |o| o.flags = parse_u32(&mut o.pending, "flags", e.text()))
}

pub(crate) fn org_unit_resource(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_org_unit(s, |o| o.resources.extend(resource_path(e)))
}

// ── Projects ────────────────────────────────────────────────

pub(crate) fn project_enter(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    s.project = Some(ProjectAccumulator::default());
    Ok(())
}

pub(crate) fn project_leave(s: &mut Reading<'_, '_>, _: &Element) -> Result<()> {
    if let Some(project) = s.project.take() {
        s.session.build_project(project);
    }
    Ok(())
}

pub(crate) fn project_name(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_project(s, |p| p.name = text(e))
}

pub(crate) fn project_description(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_project(s, |p| p.description = text(e))
}

pub(crate) fn project_managers(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_project(s, |p| p.managers_group = text(e))
}

pub(crate) fn project_users(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_project(s, |p| p.users_group = text(e))
}

pub(crate) fn project_resource(s: &mut Reading<'_, '_>, e: &Element) -> Result<()> {
    on_project(s, |p| p.resources.extend(resource_path(e)))
}
