//! Access control entries and principal references.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Permission bits carried in allowed/denied masks.
pub mod permissions {
    pub const READ: u32 = 1;
    pub const WRITE: u32 = 2;
    pub const VIEW: u32 = 4;
    pub const CONTROL: u32 = 8;
    pub const DIRECT_PUBLISH: u32 = 16;
}

/// Flag bits of an access control entry.
pub mod ace_flags {
    pub const DELETED: u32 = 1;
    pub const INHERIT: u32 = 2;
    pub const OVERWRITE: u32 = 4;
    pub const INHERITED: u32 = 8;
    pub const USER: u32 = 16;
    pub const GROUP: u32 = 32;
    pub const RESPONSIBLE: u32 = 64;
    pub const ALL_OTHERS: u32 = 128;
    pub const OVERWRITE_ALL: u32 = 256;
    pub const ROLE: u32 = 512;

    /// Bits that identify the principal class.
    pub const PRINCIPAL_MASK: u32 = USER | GROUP | ALL_OTHERS | OVERWRITE_ALL | ROLE;
}

/// Fixed principal id for "everybody not otherwise listed".
pub const ALL_OTHERS_ID: &str = "00000000-0000-0000-0000-0000000000a1";

/// Fixed principal id for "replace all inherited entries".
pub const OVERWRITE_ALL_ID: &str = "00000000-0000-0000-0000-0000000000a2";

const GROUP_PREFIX: &str = "GROUP.";
const USER_PREFIX: &str = "USER.";
const ROLE_PREFIX: &str = "ROLE.";
const ALL_OTHERS_NAME: &str = "ALL_OTHERS";
const OVERWRITE_ALL_NAME: &str = "OVERWRITE_ALL";

/// A principal in one of the five disjoint classes an ACE can address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "name", rename_all = "snake_case")]
pub enum PrincipalRef {
    Group(String),
    User(String),
    Role(String),
    AllOthers,
    OverwriteAll,
}

impl PrincipalRef {
    /// Decode a legacy principal: a bare name whose class is given by flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the flags name neither a user nor a group.
    pub fn from_legacy(name: &str, flags: u32) -> Result<Self, Error> {
        if flags & ace_flags::GROUP != 0 {
            Ok(Self::Group(name.to_string()))
        } else if flags & ace_flags::USER != 0 {
            Ok(Self::User(name.to_string()))
        } else {
            Err(Error::InvalidValue {
                field: "principal",
                value: format!("{name} (flags {flags})"),
            })
        }
    }

    /// The ACE flag bit identifying this principal class.
    #[must_use]
    pub const fn class_flag(&self) -> u32 {
        match self {
            Self::Group(_) => ace_flags::GROUP,
            Self::User(_) => ace_flags::USER,
            Self::Role(_) => ace_flags::ROLE,
            Self::AllOthers => ace_flags::ALL_OTHERS,
            Self::OverwriteAll => ace_flags::OVERWRITE_ALL,
        }
    }

    /// Name of the addressed user, group or role.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Group(n) | Self::User(n) | Self::Role(n) => Some(n),
            Self::AllOthers | Self::OverwriteAll => None,
        }
    }
}

impl fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(n) => write!(f, "{GROUP_PREFIX}{n}"),
            Self::User(n) => write!(f, "{USER_PREFIX}{n}"),
            Self::Role(n) => write!(f, "{ROLE_PREFIX}{n}"),
            Self::AllOthers => f.write_str(ALL_OTHERS_NAME),
            Self::OverwriteAll => f.write_str(OVERWRITE_ALL_NAME),
        }
    }
}

impl std::str::FromStr for PrincipalRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || Error::InvalidValue {
            field: "principal",
            value: s.to_string(),
        };
        if s == ALL_OTHERS_NAME {
            Ok(Self::AllOthers)
        } else if s == OVERWRITE_ALL_NAME {
            Ok(Self::OverwriteAll)
        } else if let Some(name) = s.strip_prefix(GROUP_PREFIX) {
            non_empty(name).map(Self::Group).ok_or_else(invalid)
        } else if let Some(name) = s.strip_prefix(USER_PREFIX) {
            non_empty(name).map(Self::User).ok_or_else(invalid)
        } else if let Some(name) = s.strip_prefix(ROLE_PREFIX) {
            non_empty(name).map(Self::Role).ok_or_else(invalid)
        } else {
            Err(invalid())
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    (!name.is_empty()).then(|| name.to_string())
}

/// An access control entry as stored by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub principal_id: String,
    pub allowed: u32,
    pub denied: u32,
    pub flags: u32,
}

impl AccessControlEntry {
    /// Entries inherited from a parent are never transferred.
    #[must_use]
    pub const fn is_inherited(&self) -> bool {
        self.flags & ace_flags::INHERITED != 0
    }
}

/// An access control entry read from an archive, before principal resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceRecord {
    pub principal: PrincipalRef,
    pub allowed: u32,
    pub denied: u32,
    pub flags: u32,
}

impl AceRecord {
    /// Bind to a resolved principal id, making sure the class flag is set.
    #[must_use]
    pub fn resolve(&self, principal_id: String) -> AccessControlEntry {
        AccessControlEntry {
            principal_id,
            allowed: self.allowed,
            denied: self.denied,
            flags: (self.flags & !ace_flags::PRINCIPAL_MASK) | self.principal.class_flag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_prefix_round_trip() {
        for raw in [
            "GROUP.Users",
            "USER.Admin",
            "ROLE.WORKPLACE_USER",
            "ALL_OTHERS",
            "OVERWRITE_ALL",
        ] {
            let parsed: PrincipalRef = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn test_principal_rejects_unknown_prefix() {
        assert!("TEAM.x".parse::<PrincipalRef>().is_err());
        assert!("GROUP.".parse::<PrincipalRef>().is_err());
    }

    #[test]
    fn test_legacy_principal_uses_flags() {
        assert_eq!(
            PrincipalRef::from_legacy("Users", ace_flags::GROUP | ace_flags::INHERIT).unwrap(),
            PrincipalRef::Group("Users".into())
        );
        assert_eq!(
            PrincipalRef::from_legacy("Admin", ace_flags::USER).unwrap(),
            PrincipalRef::User("Admin".into())
        );
        assert!(PrincipalRef::from_legacy("x", ace_flags::INHERIT).is_err());
    }

    #[test]
    fn test_resolve_replaces_class_flag() {
        let rec = AceRecord {
            principal: PrincipalRef::Role("EDITOR".into()),
            allowed: permissions::READ | permissions::WRITE,
            denied: 0,
            flags: ace_flags::GROUP | ace_flags::INHERIT,
        };
        let ace = rec.resolve("role:EDITOR".into());
        assert_eq!(ace.flags, ace_flags::ROLE | ace_flags::INHERIT);
        assert_eq!(ace.allowed, 3);
    }
}
