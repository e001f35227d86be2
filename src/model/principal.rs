//! Users, groups and organizational units.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::model::Project;

/// Fully qualified name of the root organizational unit.
pub const ROOT_ORG_UNIT: &str = "/";

/// A typed entry of a user's additional info map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InfoValue {
    Text(String),
    Number(i64),
    Flag(bool),
}

impl InfoValue {
    /// Parse a raw value according to its declared type name.
    ///
    /// Accepts short names (`string`, `long`, `boolean`) and the qualified
    /// names older producers wrote (`java.lang.String`, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown or the value does not parse.
    pub fn parse(type_name: &str, raw: &str) -> Result<Self, Error> {
        let short = type_name.rsplit('.').next().unwrap_or(type_name);
        let invalid = || Error::InvalidValue {
            field: "userinfo",
            value: format!("{type_name}:{raw}"),
        };
        match short.to_ascii_lowercase().as_str() {
            "" | "string" => Ok(Self::Text(raw.to_string())),
            "long" | "integer" | "int" => raw.trim().parse().map(Self::Number).map_err(|_| invalid()),
            "boolean" | "bool" => raw.trim().parse().map(Self::Flag).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Number(_) => "long",
            Self::Flag(_) => "boolean",
        }
    }

    #[must_use]
    pub fn raw(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Flag(b) => b.to_string(),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Password hash as exported; never a clear-text password.
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub flags: u32,
    pub date_created: i64,
    #[serde(default)]
    pub info: BTreeMap<String, InfoValue>,
    #[serde(default)]
    pub org_unit: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A group of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub flags: u32,
    pub parent: Option<String>,
    #[serde(default)]
    pub org_unit: String,
}

/// An organizational unit: a named boundary over resources and principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    /// Fully qualified name, `/` for the root, `a/b/` below it.
    pub name: String,
    pub description: String,
    pub flags: u32,
    pub resources: Vec<String>,
}

/// Parent of a fully qualified org unit name.
#[must_use]
pub fn parent_org_unit(name: &str) -> Option<String> {
    let trimmed = name.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(idx) => Some(format!("{}/", &trimmed[..idx])),
        None => Some(ROOT_ORG_UNIT.to_string()),
    }
}

/// Normalise an org unit name to its fully qualified form.
#[must_use]
pub fn normalize_org_unit(name: &str) -> String {
    let trimmed = name.trim().trim_matches('/');
    if trimmed.is_empty() {
        ROOT_ORG_UNIT.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Any account-side entity an archive can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrincipalRecord {
    User(User),
    Group(Group),
    OrgUnit(OrgUnit),
    Project(Project),
}

impl PrincipalRecord {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::User(u) => &u.name,
            Self::Group(g) => &g.name,
            Self::OrgUnit(o) => &o.name,
            Self::Project(p) => &p.name,
        }
    }

    /// Noun used in reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
            Self::OrgUnit(_) => "org unit",
            Self::Project(_) => "project",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_value_parse() {
        assert_eq!(InfoValue::parse("string", "x").unwrap(), InfoValue::Text("x".into()));
        assert_eq!(InfoValue::parse("java.lang.Long", "42").unwrap(), InfoValue::Number(42));
        assert_eq!(InfoValue::parse("java.lang.Boolean", "true").unwrap(), InfoValue::Flag(true));
        assert!(InfoValue::parse("long", "abc").is_err());
        assert!(InfoValue::parse("java.util.Date", "x").is_err());
    }

    #[test]
    fn test_org_unit_names() {
        assert_eq!(parent_org_unit("/"), None);
        assert_eq!(parent_org_unit("dept/").as_deref(), Some("/"));
        assert_eq!(parent_org_unit("dept/sales/").as_deref(), Some("dept/"));
        assert_eq!(normalize_org_unit(""), "/");
        assert_eq!(normalize_org_unit("/dept"), "dept/");
    }

    #[test]
    fn test_principal_record_tagging() {
        let record = PrincipalRecord::OrgUnit(OrgUnit {
            name: "dept/".into(),
            description: String::new(),
            flags: 0,
            resources: vec!["/dept".into()],
        });
        assert_eq!(record.name(), "dept/");
        assert_eq!(record.kind(), "org unit");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "org_unit");
    }
}
