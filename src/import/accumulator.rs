//! Per-entity accumulators.
//!
//! Entering an entity element starts a fresh accumulator; every child
//! element updates one field. A value that does not parse marks the
//! accumulator as failed instead of raising, so one bad entity never stops
//! the manifest walk. The builder drops failed accumulators with a report
//! line when the entity closes.

use std::collections::BTreeMap;

use crate::model::{AceRecord, DateValue, InfoValue, PropertyValue, PrincipalRef};

/// Records the first problem seen while accumulating an entity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pending {
    error: Option<String>,
}

impl Pending {
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Parse an unsigned number field, recording a failure on bad input.
pub fn parse_u32(pending: &mut Pending, field: &str, raw: &str) -> u32 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    raw.parse().unwrap_or_else(|_| {
        pending.fail(format!("invalid {field} '{raw}'"));
        0
    })
}

/// The date slots of a file entry.
pub mod date_field {
    pub const CREATED: u8 = 0;
    pub const LAST_MODIFIED: u8 = 1;
    pub const RELEASED: u8 = 2;
    pub const EXPIRED: u8 = 3;
}

/// A property while its children are read.
#[derive(Debug, Default, Clone)]
pub struct PropertyDraft {
    pub name: String,
    pub value: String,
    pub shared: bool,
}

impl PropertyDraft {
    #[must_use]
    pub fn build(self) -> PropertyValue {
        if self.shared {
            PropertyValue::shared(&self.name, &self.value)
        } else {
            PropertyValue::individual(&self.name, &self.value)
        }
    }
}

/// A relation as declared in a file entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationDecl {
    pub id: Option<String>,
    pub path: String,
    pub relation_type: String,
}

/// An access control entry while its children are read.
#[derive(Debug, Default, Clone)]
pub struct AceDraft {
    pub principal: String,
    pub flags: u32,
    pub allowed: u32,
    pub denied: u32,
}

impl AceDraft {
    #[must_use]
    pub fn build(self, principal: PrincipalRef) -> AceRecord {
        AceRecord {
            principal,
            allowed: self.allowed,
            denied: self.denied,
            flags: self.flags,
        }
    }
}

/// Fields of one `file` entry.
#[derive(Debug, Default)]
pub struct FileAccumulator {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub type_name: Option<String>,
    pub structure_id: Option<String>,
    pub resource_id: Option<String>,
    pub dates: [Option<DateValue>; 4],
    pub user_created: Option<String>,
    pub user_last_modified: Option<String>,
    pub flags: u32,
    pub properties: Vec<PropertyValue>,
    pub relations: Vec<RelationDecl>,
    pub aces: Vec<AceRecord>,
    pub property: Option<PropertyDraft>,
    pub relation: Option<RelationDecl>,
    pub ace: Option<AceDraft>,
    pub pending: Pending,
}

impl FileAccumulator {
    pub fn set_date(&mut self, field: u8, value: crate::error::Result<DateValue>) {
        match value {
            Ok(date) => {
                if let Some(slot) = self.dates.get_mut(usize::from(field)) {
                    *slot = Some(date);
                }
            }
            Err(e) => self.pending.fail(e.to_string()),
        }
    }

    #[must_use]
    pub fn date(&self, field: u8) -> Option<DateValue> {
        self.dates.get(usize::from(field)).copied().flatten()
    }
}

/// Fields of one `user` (or legacy `userdata`) entry.
#[derive(Debug, Default)]
pub struct UserAccumulator {
    pub name: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub flags: u32,
    pub date_created: Option<i64>,
    pub info: BTreeMap<String, InfoValue>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub pending: Pending,
}

/// Fields of one `group` (or legacy `groupdata`) entry.
#[derive(Debug, Default)]
pub struct GroupAccumulator {
    pub name: String,
    pub description: String,
    pub flags: u32,
    pub parent: Option<String>,
    pub pending: Pending,
}

/// Fields of one `orgunit` entry.
#[derive(Debug, Default)]
pub struct OrgUnitAccumulator {
    pub name: String,
    pub description: String,
    pub flags: u32,
    pub resources: Vec<String>,
    /// Set once the unit has been handed to the builder; nested groups and
    /// users need it to exist before they are created.
    pub built: bool,
    pub pending: Pending,
}

/// Fields of one `project` entry.
#[derive(Debug, Default)]
pub struct ProjectAccumulator {
    pub name: String,
    pub description: String,
    pub users_group: String,
    pub managers_group: String,
    pub resources: Vec<String>,
    pub pending: Pending,
}
