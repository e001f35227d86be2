//! Project model.
//!
//! Projects scope editing work to a set of resource paths and name the groups
//! that may work in and manage them.

use serde::{Deserialize, Serialize};

/// Name of the project every repository starts with.
pub const ONLINE_PROJECT: &str = "Online";

/// A project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (UUID format); empty until persisted
    #[serde(default)]
    pub id: String,

    /// Unique project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: String,

    /// Group whose members may work in the project
    pub users_group: String,

    /// Group whose members may manage the project
    pub managers_group: String,

    /// Resource paths belonging to the project
    #[serde(default)]
    pub resources: Vec<String>,

    /// Creation timestamp (Unix milliseconds)
    #[serde(default)]
    pub created_at: i64,
}

impl Project {
    /// Create a new project with default values.
    #[must_use]
    pub fn new(name: String, users_group: String, managers_group: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description: String::new(),
            users_group,
            managers_group,
            resources: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project() {
        let project = Project::new(
            "Offline".to_string(),
            "Users".to_string(),
            "Projectmanagers".to_string(),
        );

        assert_eq!(project.id.len(), 36);
        assert_eq!(project.name, "Offline");
        assert!(project.resources.is_empty());
    }
}
