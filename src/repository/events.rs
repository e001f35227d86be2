//! Audit event storage and retrieval.
//!
//! Every repository mutation records who changed what, so an import can be
//! traced back after the fact.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Resource events
    ResourceCreated,
    ResourceUpdated,
    ContentWritten,
    AclWritten,

    // Relation events
    RelationAdded,

    // Account events
    UserCreated,
    GroupCreated,
    GroupParentSet,
    MembershipAdded,
    RoleAdded,
    OrgUnitCreated,
    OrgUnitResourceAdded,
    OrgUnitResourceRemoved,

    // Project events
    ProjectCreated,
    ProjectResourceAdded,

    // Lock events
    Locked,
    LockChanged,
    Unlocked,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceCreated => "resource_created",
            Self::ResourceUpdated => "resource_updated",
            Self::ContentWritten => "content_written",
            Self::AclWritten => "acl_written",
            Self::RelationAdded => "relation_added",
            Self::UserCreated => "user_created",
            Self::GroupCreated => "group_created",
            Self::GroupParentSet => "group_parent_set",
            Self::MembershipAdded => "membership_added",
            Self::RoleAdded => "role_added",
            Self::OrgUnitCreated => "orgunit_created",
            Self::OrgUnitResourceAdded => "orgunit_resource_added",
            Self::OrgUnitResourceRemoved => "orgunit_resource_removed",
            Self::ProjectCreated => "project_created",
            Self::ProjectResourceAdded => "project_resource_added",
            Self::Locked => "locked",
            Self::LockChanged => "lock_changed",
            Self::Unlocked => "unlocked",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "resource_created" => Self::ResourceCreated,
            "resource_updated" => Self::ResourceUpdated,
            "content_written" => Self::ContentWritten,
            "acl_written" => Self::AclWritten,
            "relation_added" => Self::RelationAdded,
            "user_created" => Self::UserCreated,
            "group_created" => Self::GroupCreated,
            "group_parent_set" => Self::GroupParentSet,
            "membership_added" => Self::MembershipAdded,
            "role_added" => Self::RoleAdded,
            "orgunit_created" => Self::OrgUnitCreated,
            "orgunit_resource_added" => Self::OrgUnitResourceAdded,
            "orgunit_resource_removed" => Self::OrgUnitResourceRemoved,
            "project_created" => Self::ProjectCreated,
            "project_resource_added" => Self::ProjectResourceAdded,
            "locked" => Self::Locked,
            "lock_changed" => Self::LockChanged,
            "unlocked" => Self::Unlocked,
            _ => return Err(format!("Unknown event type: {s}")),
        })
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Add a comment to the event.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// Rows with an event type this build does not know are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        let raw: String = row.get(3)?;
        let Ok(event_type) = raw.parse::<EventType>() else {
            return Ok(None);
        };
        Ok(Some(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        }))
    })?;

    let mut events = Vec::new();
    for row in rows {
        if let Some(event) = row? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Count events of one type across all entities.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_events(conn: &Connection, event_type: EventType) -> Result<u64> {
    conn.query_row(
        "SELECT COUNT(*) FROM events WHERE event_type = ?1",
        [event_type.as_str()],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("resource", "/a.html", EventType::ResourceCreated, "Admin")
            .with_comment("imported");

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "resource", "/a.html", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "Admin");
        assert_eq!(events[0].comment, Some("imported".to_string()));
        assert_eq!(count_events(&conn, EventType::ResourceCreated).unwrap(), 1);
    }

    #[test]
    fn test_event_type_round_trip() {
        for t in [EventType::RelationAdded, EventType::OrgUnitResourceRemoved, EventType::Unlocked] {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("resource_renamed_twice".parse::<EventType>().is_err());
    }
}
