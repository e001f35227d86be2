//! Resource properties.

use serde::{Deserialize, Serialize};

/// Property that selects the timestamp mode used when exporting a resource.
pub const PROPERTY_EXPORT_TIMESTAMP: &str = "export.timestamp";

/// A named property with an individual and a shared value.
///
/// The structure value belongs to one placement; the resource value is
/// shared by all siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub name: String,
    pub structure_value: Option<String>,
    pub resource_value: Option<String>,
}

impl PropertyValue {
    #[must_use]
    pub fn individual(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            structure_value: Some(value.to_string()),
            resource_value: None,
        }
    }

    #[must_use]
    pub fn shared(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            structure_value: None,
            resource_value: Some(value.to_string()),
        }
    }

    /// The effective value: individual wins over shared.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.structure_value
            .as_deref()
            .or(self.resource_value.as_deref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structure_value.is_none() && self.resource_value.is_none()
    }

    /// Fold another value for the same name into this one.
    pub fn merge(&mut self, other: PropertyValue) {
        if other.structure_value.is_some() {
            self.structure_value = other.structure_value;
        }
        if other.resource_value.is_some() {
            self.resource_value = other.resource_value;
        }
    }
}

/// Drop denylisted property names and merge duplicates, keeping first-seen order.
#[must_use]
pub fn filter_properties(properties: Vec<PropertyValue>, ignored: &[String]) -> Vec<PropertyValue> {
    let mut result: Vec<PropertyValue> = Vec::with_capacity(properties.len());
    for prop in properties {
        if prop.is_empty() || ignored.iter().any(|name| name == &prop.name) {
            continue;
        }
        match result.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => existing.merge(prop),
            None => result.push(prop),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_prefers_individual() {
        let mut prop = PropertyValue::shared("Title", "shared");
        assert_eq!(prop.value(), Some("shared"));
        prop.merge(PropertyValue::individual("Title", "mine"));
        assert_eq!(prop.value(), Some("mine"));
        assert_eq!(prop.resource_value.as_deref(), Some("shared"));
    }

    #[test]
    fn test_filter_drops_denylisted_and_merges() {
        let props = vec![
            PropertyValue::individual("Title", "a"),
            PropertyValue::individual("secret", "x"),
            PropertyValue::shared("Title", "b"),
        ];
        let filtered = filter_properties(props, &["secret".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].structure_value.as_deref(), Some("a"));
        assert_eq!(filtered[0].resource_value.as_deref(), Some("b"));
    }
}
