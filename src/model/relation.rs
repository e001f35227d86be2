//! Relations between resources.

use serde::{Deserialize, Serialize};

/// Relation types the repository derives from content itself.
///
/// These are recreated by link correction and are never declared explicitly.
pub const CONTENT_DEFINED_TYPES: &[&str] = &[
    "XML_STRONG",
    "XML_WEAK",
    "JSP_STRONG",
    "JSP_WEAK",
    "HYPERLINK",
    "EMBEDDED_IMAGE",
    "EMBEDDED_OBJECT",
];

/// A relation declared in an archive, pending resolution.
///
/// The source is a position in the resource stream rather than a structure
/// id: the source resource may still fail to import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRef {
    pub source_index: usize,
    pub target_path: String,
    pub target_id: Option<String>,
    pub relation_type: String,
}

/// A relation in the live repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source_id: String,
    pub source_path: String,
    pub target_id: String,
    pub target_path: String,
    pub relation_type: String,
}

impl Relation {
    #[must_use]
    pub fn is_content_defined(&self) -> bool {
        is_content_defined(&self.relation_type)
    }
}

#[must_use]
pub fn is_content_defined(relation_type: &str) -> bool {
    CONTENT_DEFINED_TYPES.contains(&relation_type)
}

/// Relation type names are upper-case identifiers.
#[must_use]
pub fn is_valid_relation_type(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_type_validation() {
        assert!(is_valid_relation_type("CATEGORY"));
        assert!(is_valid_relation_type("XML_WEAK"));
        assert!(!is_valid_relation_type("weak"));
        assert!(!is_valid_relation_type(""));
    }

    #[test]
    fn test_content_defined() {
        assert!(is_content_defined("XML_STRONG"));
        assert!(!is_content_defined("CATEGORY"));
    }
}
