//! Data models for cmsport.
//!
//! This module contains all transferred entities:
//! - Resource records and live resources
//! - Properties
//! - Access control entries and principal references
//! - Relations
//! - Users, groups, organizational units
//! - Projects

pub mod acl;
pub mod principal;
pub mod project;
pub mod property;
pub mod relation;
pub mod resource;

pub use acl::{AccessControlEntry, AceRecord, PrincipalRef};
pub use principal::{Group, InfoValue, OrgUnit, PrincipalRecord, User};
pub use project::Project;
pub use property::PropertyValue;
pub use relation::{Relation, RelationRef};
pub use resource::{DateValue, Resource, ResourceRecord, ResourceState};
