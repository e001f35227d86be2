//! Database schema definitions.
//!
//! Timestamps are stored as INTEGER (Unix milliseconds). Resources are keyed
//! by path; content lives in its own table keyed by resource id so siblings
//! share one blob.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the repository database.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Resources
-- ====================

-- One row per placement (structure id)
CREATE TABLE IF NOT EXISTS resources (
    structure_id TEXT PRIMARY KEY,
    resource_id TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    parent_path TEXT,
    type_name TEXT NOT NULL,
    is_folder INTEGER NOT NULL DEFAULT 0,
    flags INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'new',
    date_created INTEGER NOT NULL,
    user_created TEXT NOT NULL,
    date_last_modified INTEGER NOT NULL,
    user_last_modified TEXT NOT NULL,
    date_released INTEGER NOT NULL DEFAULT 0,
    date_expired INTEGER NOT NULL DEFAULT 9223372036854775807
);

CREATE INDEX IF NOT EXISTS idx_resources_parent ON resources(parent_path);
CREATE INDEX IF NOT EXISTS idx_resources_resource_id ON resources(resource_id);

-- Shared content (resource id)
CREATE TABLE IF NOT EXISTS contents (
    resource_id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    sha256 TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Property definitions and values
CREATE TABLE IF NOT EXISTS property_definitions (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS properties (
    path TEXT NOT NULL,
    name TEXT NOT NULL REFERENCES property_definitions(name),
    structure_value TEXT,
    resource_value TEXT,
    PRIMARY KEY (path, name),
    FOREIGN KEY (path) REFERENCES resources(path) ON DELETE CASCADE ON UPDATE CASCADE
);

-- Relations between placements
CREATE TABLE IF NOT EXISTS relations (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (source_id, target_id, relation_type),
    FOREIGN KEY (source_id) REFERENCES resources(structure_id) ON DELETE CASCADE,
    FOREIGN KEY (target_id) REFERENCES resources(structure_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);

-- Access control entries set directly on a resource
CREATE TABLE IF NOT EXISTS aces (
    structure_id TEXT NOT NULL,
    principal_id TEXT NOT NULL,
    allowed INTEGER NOT NULL DEFAULT 0,
    denied INTEGER NOT NULL DEFAULT 0,
    flags INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (structure_id, principal_id),
    FOREIGN KEY (structure_id) REFERENCES resources(structure_id) ON DELETE CASCADE
);

-- Exclusive locks
CREATE TABLE IF NOT EXISTS locks (
    path TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    project TEXT NOT NULL,
    locked_at INTEGER NOT NULL
);

-- ====================
-- Accounts
-- ====================

CREATE TABLE IF NOT EXISTS org_units (
    name TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT '',
    flags INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS org_unit_resources (
    org_unit TEXT NOT NULL,
    path TEXT NOT NULL,
    PRIMARY KEY (org_unit, path),
    FOREIGN KEY (org_unit) REFERENCES org_units(name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    flags INTEGER NOT NULL DEFAULT 0,
    parent_id TEXT REFERENCES groups(id),
    org_unit TEXT NOT NULL REFERENCES org_units(name),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL DEFAULT '',
    firstname TEXT NOT NULL DEFAULT '',
    lastname TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    flags INTEGER NOT NULL DEFAULT 0,
    date_created INTEGER NOT NULL,
    info TEXT NOT NULL DEFAULT '{}',
    org_unit TEXT NOT NULL REFERENCES org_units(name)
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id),
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id TEXT NOT NULL,
    role TEXT NOT NULL,
    PRIMARY KEY (user_id, role),
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ====================
-- Projects
-- ====================

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    users_group TEXT NOT NULL,
    managers_group TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project_resources (
    project_id TEXT NOT NULL,
    path TEXT NOT NULL,
    PRIMARY KEY (project_id, path),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

-- ====================
-- Configuration cache
-- ====================

-- Configuration writes become visible once visible_at has passed
CREATE TABLE IF NOT EXISTS config_queue (
    path TEXT PRIMARY KEY,
    visible_at INTEGER NOT NULL
);

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
"#;

/// Rows every repository starts with: the root folder and the root unit.
const SEED_SQL: &str = r#"
INSERT OR IGNORE INTO resources (
    structure_id, resource_id, path, parent_path, type_name, is_folder, flags, state,
    date_created, user_created, date_last_modified, user_last_modified
) VALUES (
    '00000000-0000-0000-0000-000000000001', '00000000-0000-0000-0000-000000000002',
    '/', NULL, 'folder', 1, 0, 'unchanged', 0, 'Admin', 0, 'Admin'
);

INSERT OR IGNORE INTO org_units (name, description, flags, created_at)
VALUES ('/', 'Root organizational unit', 0, 0);

INSERT OR IGNORE INTO org_unit_resources (org_unit, path) VALUES ('/', '/');
"#;

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(SEED_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "resources",
            "contents",
            "properties",
            "relations",
            "aces",
            "locks",
            "org_units",
            "groups",
            "users",
            "projects",
            "config_queue",
            "events",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");

        let roots: i32 = conn
            .query_row("SELECT COUNT(*) FROM resources WHERE path = '/'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(roots, 1);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }
}
