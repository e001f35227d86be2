//! Repository collaborator used by import and export.
//!
//! The archive engine only talks to a live repository through the
//! [`Repository`] trait. [`SqliteRepository`] is the bundled implementation:
//! - Transaction discipline for every mutation
//! - Audit events for history
//! - Link correction for link-parseable content
//! - Delayed configuration visibility, polled by the link rewriter
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`links`] - Link fragment parsing and correction
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite repository implementation

pub mod events;
pub mod links;
pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteRepository;

use crate::error::Result;
use crate::model::{
    AccessControlEntry, Group, OrgUnit, PrincipalRef, Project, PropertyValue, Relation, Resource,
    ResourceRecord, User,
};

/// Which resources a read may return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub include_deleted: bool,
}

impl ResourceFilter {
    /// Everything except resources marked deleted.
    pub const DEFAULT: Self = Self {
        include_deleted: false,
    };

    /// Every resource, including deleted ones.
    pub const ALL: Self = Self {
        include_deleted: true,
    };
}

/// Options for a content write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Re-resolve internal links in the written content.
    pub auto_correct_links: bool,
}

/// Lock state of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Exclusive {
        /// User holding the lock.
        owner: String,
        /// Project (working context) the lock was taken in.
        project: String,
    },
}

/// Everything the archive engine needs from a live repository.
///
/// All paths are absolute repository paths.
pub trait Repository {
    // ── Context ─────────────────────────────────────────────

    /// User the repository acts as.
    fn current_user(&self) -> &str;

    /// Project (working context) the repository acts in.
    fn current_project(&self) -> &str;

    // ── Resources ───────────────────────────────────────────

    /// Read a resource by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_resource(&self, path: &str, filter: ResourceFilter) -> Result<Option<Resource>>;

    /// Read a resource by structure id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_resource_by_id(
        &self,
        structure_id: &str,
        filter: ResourceFilter,
    ) -> Result<Option<Resource>>;

    /// Whether a resource exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.read_resource(path, ResourceFilter::DEFAULT)?.is_some())
    }

    /// Create or replace a resource from an archive record.
    ///
    /// When `content` is `None` and the resource id already has content, the
    /// new placement becomes a sibling sharing it. Missing parent folders are
    /// created.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be written.
    fn import_resource(
        &mut self,
        record: &ResourceRecord,
        content: Option<&[u8]>,
        properties: &[PropertyValue],
    ) -> Result<Resource>;

    /// Direct children of a folder, folders first, each group by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_children(&self, folder: &str, filter: ResourceFilter) -> Result<Vec<Resource>>;

    /// Content bytes of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist.
    fn read_content(&self, path: &str) -> Result<Vec<u8>>;

    /// Replace the content of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist or is locked by
    /// someone else.
    fn write_content(&mut self, path: &str, content: &[u8], options: WriteOptions) -> Result<()>;

    /// Overwrite the last-modified date without touching anything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist.
    fn set_date_last_modified(&mut self, path: &str, date: i64) -> Result<()>;

    // ── Properties ──────────────────────────────────────────

    /// Properties set directly on a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_properties(&self, path: &str) -> Result<Vec<PropertyValue>>;

    /// Whether a property definition exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn has_property_definition(&self, name: &str) -> Result<bool>;

    /// Create a property definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be stored.
    fn create_property_definition(&mut self, name: &str) -> Result<()>;

    // ── Relations ───────────────────────────────────────────

    /// Create a relation between two existing resources.
    ///
    /// # Errors
    ///
    /// Returns an error if either resource does not exist.
    fn add_relation(&mut self, source: &str, target: &str, relation_type: &str) -> Result<()>;

    /// Relations whose source is `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_relations(&self, path: &str) -> Result<Vec<Relation>>;

    // ── Access control ──────────────────────────────────────

    /// Entries set directly on a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_aces(&self, path: &str) -> Result<Vec<AccessControlEntry>>;

    /// Replace the entries set directly on a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource does not exist.
    fn write_aces(&mut self, path: &str, aces: &[AccessControlEntry]) -> Result<()>;

    /// Map a principal reference to its id, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn resolve_principal(&self, principal: &PrincipalRef) -> Result<Option<String>>;

    /// Map a principal id back to its reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn describe_principal(&self, principal_id: &str) -> Result<Option<PrincipalRef>>;

    // ── Accounts ────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_user(&self, name: &str) -> Result<Option<User>>;

    /// Users whose home is the given org unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_users(&self, org_unit: &str) -> Result<Vec<User>>;

    /// Create a user. Group memberships and roles are added separately.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    fn create_user(&mut self, user: &User) -> Result<User>;

    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_group(&self, name: &str) -> Result<Option<Group>>;

    /// Groups whose home is the given org unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_groups(&self, org_unit: &str) -> Result<Vec<Group>>;

    /// Create a group; its parent, if any, must already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or the parent is missing.
    fn create_group(&mut self, group: &Group) -> Result<Group>;

    /// # Errors
    ///
    /// Returns an error if either group does not exist.
    fn set_parent_group(&mut self, child: &str, parent: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the user or group does not exist.
    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the user does not exist.
    fn add_user_to_role(&mut self, user: &str, role: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_org_unit(&self, name: &str) -> Result<Option<OrgUnit>>;

    /// All org units, parents before children.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_org_units(&self) -> Result<Vec<OrgUnit>>;

    /// Create an org unit with one initial resource, which must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent unit or the resource does not exist.
    fn create_org_unit(&mut self, org_unit: &OrgUnit, initial_resource: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the unit or the resource does not exist.
    fn add_resource_to_org_unit(&mut self, org_unit: &str, path: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the unit does not exist.
    fn remove_resource_from_org_unit(&mut self, org_unit: &str, path: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_project(&self, name: &str) -> Result<Option<Project>>;

    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn read_projects(&self) -> Result<Vec<Project>>;

    /// # Errors
    ///
    /// Returns an error if the name is taken or a group is missing.
    fn create_project(&mut self, project: &Project) -> Result<Project>;

    /// # Errors
    ///
    /// Returns an error if the project or the resource does not exist.
    fn add_resource_to_project(&mut self, project: &str, path: &str) -> Result<()>;

    // ── Locks ───────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn lock_state(&self, path: &str) -> Result<LockState>;

    /// Lock an unlocked resource for the current user.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is locked.
    fn lock(&mut self, path: &str) -> Result<()>;

    /// Take over a lock held in the current project.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock belongs to another project.
    fn change_lock(&mut self, path: &str) -> Result<()>;

    /// Release a lock held by the current user.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock belongs to someone else.
    fn unlock(&mut self, path: &str) -> Result<()>;

    // ── Configuration cache ─────────────────────────────────

    /// Whether every configuration change written so far is visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read.
    fn configuration_converged(&mut self) -> Result<bool>;
}
