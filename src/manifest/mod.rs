//! Manifest reading and writing.
//!
//! The manifest is the XML document at the root of every archive. Readers
//! never build a tree: [`walker::walk`] streams the document and dispatches
//! each element to the handlers of a per-dialect rule table. Writers stream
//! the other way, one small [`writer::Node`] at a time.
//!
//! # Submodules
//!
//! - [`dates`] - Date encoding and the date macros
//! - [`walker`] - Rule-table driven streaming reader
//! - [`writer`] - Streaming writer

pub mod dates;
pub mod walker;
pub mod writer;

pub use walker::{Element, Rule, walk};
pub use writer::{ManifestWriter, Node};

// Root and header.
pub const N_EXPORT: &str = "export";
pub const N_INFO: &str = "info";
pub const N_CREATOR: &str = "creator";
pub const N_PRODUCT_VERSION: &str = "product_version";
pub const N_CREATEDATE: &str = "createdate";
pub const N_INFOPROJECT: &str = "infoproject";
pub const N_VERSION: &str = "export_version";

// Resources.
pub const N_FILES: &str = "files";
pub const N_FILE: &str = "file";
pub const N_SOURCE: &str = "source";
pub const N_DESTINATION: &str = "destination";
pub const N_TYPE: &str = "type";
pub const N_UUIDSTRUCTURE: &str = "uuidstructure";
pub const N_UUIDRESOURCE: &str = "uuidresource";
pub const N_DATELASTMODIFIED: &str = "datelastmodified";
pub const N_USERLASTMODIFIED: &str = "userlastmodified";
pub const N_DATECREATED: &str = "datecreated";
pub const N_USERCREATED: &str = "usercreated";
pub const N_DATERELEASED: &str = "datereleased";
pub const N_DATEEXPIRED: &str = "dateexpired";
pub const N_FLAGS: &str = "flags";
pub const N_PROPERTIES: &str = "properties";
pub const N_PROPERTY: &str = "property";
pub const N_NAME: &str = "name";
pub const N_VALUE: &str = "value";
pub const N_RELATIONS: &str = "relations";
pub const N_RELATION: &str = "relation";
pub const N_ID: &str = "id";
pub const N_PATH: &str = "path";
pub const N_ACCESSCONTROL: &str = "accesscontrol";
pub const N_ACCESSENTRY: &str = "accessentry";
pub const N_UUIDPRINCIPAL: &str = "uuidprincipal";
pub const N_PERMISSIONSET: &str = "permissionset";
pub const N_ALLOWED: &str = "allowed";
pub const N_DENIED: &str = "denied";

/// Attribute marking a property value as shared by all siblings.
pub const A_TYPE: &str = "type";
pub const A_NAME: &str = "name";
pub const V_SHARED: &str = "shared";

// Accounts.
pub const N_ACCOUNTS: &str = "accounts";
pub const N_ORGUNITS: &str = "orgunits";
pub const N_ORGUNIT: &str = "orgunit";
pub const N_DESCRIPTION: &str = "description";
pub const N_RESOURCES: &str = "resources";
pub const N_RESOURCE: &str = "resource";
pub const N_GROUPS: &str = "groups";
pub const N_GROUP: &str = "group";
pub const N_PARENTGROUP: &str = "parentgroup";
pub const N_USERS: &str = "users";
pub const N_USER: &str = "user";
pub const N_PASSWORD: &str = "password";
pub const N_FIRSTNAME: &str = "firstname";
pub const N_LASTNAME: &str = "lastname";
pub const N_EMAIL: &str = "email";
pub const N_USERINFO: &str = "userinfo";
pub const N_ENTRY: &str = "entry";
pub const N_USERROLES: &str = "userroles";
pub const N_USERROLE: &str = "userrole";
pub const N_USERGROUPS: &str = "usergroups";
pub const N_USERGROUP: &str = "usergroup";

// Legacy accounts.
pub const N_USERGROUPDATA: &str = "usergroupdata";
pub const N_GROUPDATA: &str = "groupdata";
pub const N_USERDATA: &str = "userdata";
pub const N_LASTMODIFIED: &str = "lastmodified";

// Projects.
pub const N_PROJECTS: &str = "projects";
pub const N_PROJECT: &str = "project";
pub const N_MANAGERSGROUP: &str = "managersgroup";
pub const N_USERSGROUP: &str = "usersgroup";
