//! SQLite repository implementation.
//!
//! Every mutation runs through [`SqliteRepository::mutate`], which opens an
//! IMMEDIATE transaction, hands the closure a [`MutationContext`] to collect
//! audit events, then writes the events and commits.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use crate::error::{Error, Result};
use crate::hash::{content_hash, has_changed};
use crate::model::acl::{ALL_OTHERS_ID, OVERWRITE_ALL_ID};
use crate::model::principal::normalize_org_unit;
use crate::model::project::ONLINE_PROJECT;
use crate::model::resource::{FOLDER_TYPE, join_path, parent_path};
use crate::model::{
    AccessControlEntry, Group, InfoValue, OrgUnit, PrincipalRef, Project, PropertyValue, Relation,
    Resource, ResourceRecord, ResourceState, User,
};
use crate::repository::events::{Event, EventType, get_events, insert_event};
use crate::repository::links::{RELATION_STRONG, RELATION_WEAK, correct_links};
use crate::repository::schema::apply_schema;
use crate::repository::{LockState, Repository, ResourceFilter, WriteOptions};

/// User the repository acts as unless told otherwise.
pub const DEFAULT_USER: &str = "Admin";

const ROLE_ID_PREFIX: &str = "role:";

const RESOURCE_SELECT: &str = "SELECT r.structure_id, r.resource_id, r.path, r.type_name,
        r.is_folder, r.flags, r.state, r.date_created, r.user_created, r.date_last_modified,
        r.user_last_modified, r.date_released, r.date_expired,
        COALESCE((SELECT length(c.data) FROM contents c WHERE c.resource_id = r.resource_id), 0),
        (SELECT COUNT(*) FROM resources s WHERE s.resource_id = r.resource_id)
     FROM resources r";

const USER_SELECT: &str =
    "SELECT id, name, password, firstname, lastname, email, flags, date_created, info, org_unit
     FROM users";

const GROUP_SELECT: &str = "SELECT g.id, g.name, g.description, g.flags, p.name, g.org_unit
     FROM groups g LEFT JOIN groups p ON p.id = g.parent_id";

/// SQLite-based repository.
#[derive(Debug)]
pub struct SqliteRepository {
    conn: Connection,
    user: String,
    project: String,
    configuration_types: Vec<String>,
    propagation: Duration,
}

/// Context for a mutation operation, tracking side effects.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(&self.op_name),
        );
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value)
                .with_comment(&self.op_name),
        );
    }
}

fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Canonical form of a repository path: leading slash, no trailing slash.
fn normalize(path: &str) -> String {
    join_path("/", path)
}

fn deleted_clause(filter: ResourceFilter) -> &'static str {
    if filter.include_deleted {
        ""
    } else {
        " AND r.state != 'deleted'"
    }
}

fn map_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let state: String = row.get(6)?;
    let content_length: i64 = row.get(13)?;
    let sibling_count: i64 = row.get(14)?;
    Ok(Resource {
        structure_id: row.get(0)?,
        resource_id: row.get(1)?,
        path: row.get(2)?,
        type_name: row.get(3)?,
        is_folder: row.get(4)?,
        flags: row.get(5)?,
        state: state.parse().unwrap_or(ResourceState::Unchanged),
        date_created: row.get(7)?,
        user_created: row.get(8)?,
        date_last_modified: row.get(9)?,
        user_last_modified: row.get(10)?,
        date_released: row.get(11)?,
        date_expired: row.get(12)?,
        content_length: u64::try_from(content_length).unwrap_or_default(),
        sibling_count: u32::try_from(sibling_count).unwrap_or(u32::MAX),
    })
}

fn find_resource(conn: &Connection, path: &str, filter: ResourceFilter) -> Result<Option<Resource>> {
    let sql = format!("{RESOURCE_SELECT} WHERE r.path = ?1{}", deleted_clause(filter));
    Ok(conn
        .query_row(&sql, [normalize(path)], map_resource)
        .optional()?)
}

fn find_resource_by_id(
    conn: &Connection,
    structure_id: &str,
    filter: ResourceFilter,
) -> Result<Option<Resource>> {
    let sql = format!("{RESOURCE_SELECT} WHERE r.structure_id = ?1{}", deleted_clause(filter));
    Ok(conn.query_row(&sql, [structure_id], map_resource).optional()?)
}

fn require_resource(conn: &Connection, path: &str) -> Result<Resource> {
    find_resource(conn, path, ResourceFilter::ALL)?.ok_or_else(|| Error::ResourceNotFound {
        path: normalize(path),
    })
}

fn structure_id_at(conn: &Connection, path: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT structure_id FROM resources WHERE path = ?1",
            [path],
            |row| row.get(0),
        )
        .optional()?)
}

fn id_taken(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
    Ok(conn.prepare(&sql)?.exists([id])?)
}

fn group_id(conn: &Connection, name: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT id FROM groups WHERE name = ?1", [name], |row| row.get(0))
        .optional()?)
}

fn user_id(conn: &Connection, name: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT id FROM users WHERE name = ?1", [name], |row| row.get(0))
        .optional()?)
}

fn require_group_id(conn: &Connection, name: &str) -> Result<String> {
    group_id(conn, name)?.ok_or_else(|| Error::PrincipalNotFound {
        name: name.to_string(),
    })
}

fn require_user_id(conn: &Connection, name: &str) -> Result<String> {
    user_id(conn, name)?.ok_or_else(|| Error::PrincipalNotFound {
        name: name.to_string(),
    })
}

fn org_unit_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn
        .prepare("SELECT 1 FROM org_units WHERE name = ?1")?
        .exists([name])?)
}

/// Create every missing ancestor folder of `path`, outermost first.
fn ensure_parents(tx: &Transaction, ctx: &mut MutationContext, path: &str, now: i64) -> Result<()> {
    let mut missing = Vec::new();
    let mut current = parent_path(path);
    while let Some(folder) = current {
        if structure_id_at(tx, &folder)?.is_some() {
            break;
        }
        current = parent_path(&folder);
        missing.push(folder);
    }
    for folder in missing.iter().rev() {
        tx.execute(
            "INSERT INTO resources (structure_id, resource_id, path, parent_path, type_name, is_folder,
                flags, state, date_created, user_created, date_last_modified, user_last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, 'new', ?6, ?7, ?6, ?7)",
            rusqlite::params![
                fresh_id(),
                fresh_id(),
                folder,
                parent_path(folder),
                FOLDER_TYPE,
                now,
                ctx.actor,
            ],
        )?;
        ctx.record_event("resource", folder, EventType::ResourceCreated);
    }
    Ok(())
}

impl SqliteRepository {
    /// Open a repository database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a repository database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory repository (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            user: DEFAULT_USER.to_string(),
            project: ONLINE_PROJECT.to_string(),
            configuration_types: Vec::new(),
            propagation: Duration::ZERO,
        }
    }

    /// Act as `user` inside `project`.
    #[must_use]
    pub fn with_context(mut self, user: &str, project: &str) -> Self {
        self.user = user.to_string();
        self.project = project.to_string();
        self
    }

    /// Treat resources of these types as configuration whose changes only
    /// become visible after `propagation`.
    #[must_use]
    pub fn with_configuration_types(mut self, types: Vec<String>, propagation: Duration) -> Self {
        self.configuration_types = types;
        self.propagation = propagation;
        self
    }

    /// Audit events recorded for an entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn events(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        Ok(get_events(&self.conn, entity_type, entity_id, None)?)
    }

    /// Number of live resources, the root folder included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_resources(&self) -> Result<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM resources WHERE state != 'deleted'",
            [],
            |row| row.get(0),
        )?)
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    fn is_configuration(&self, type_name: &str) -> bool {
        self.configuration_types.iter().any(|t| t == type_name)
    }

    fn visible_at(&self, now: i64) -> i64 {
        now.saturating_add(i64::try_from(self.propagation.as_millis()).unwrap_or(i64::MAX))
    }

    /// Ensure the caller may write `path`: unlocked or locked by us.
    fn check_writable(&self, path: &str) -> Result<()> {
        match self.lock_state(path)? {
            LockState::Exclusive { owner, .. } if owner != self.user => Err(Error::Locked {
                path: path.to_string(),
                owner,
            }),
            _ => Ok(()),
        }
    }

    /// Re-bind link fragments and collect the content-defined relations
    /// they imply as `(target structure id, relation type)`.
    fn correct_content(&self, content: &[u8]) -> Result<Option<(Vec<u8>, Vec<(String, String)>)>> {
        let Ok(text) = std::str::from_utf8(content) else {
            return Ok(None);
        };
        let mut failure = None;
        let (corrected, links) = correct_links(text, |uuid, target| {
            let by_id = uuid.map(|id| find_resource_by_id(&self.conn, id, ResourceFilter::DEFAULT));
            let found = match by_id {
                Some(Ok(Some(res))) => Some(res),
                Some(Err(e)) => {
                    failure = Some(e);
                    None
                }
                _ => match find_resource(&self.conn, target, ResourceFilter::DEFAULT) {
                    Ok(found) => found,
                    Err(e) => {
                        failure = Some(e);
                        None
                    }
                },
            };
            found.map(|res| (res.path, res.structure_id))
        });
        if let Some(e) = failure {
            return Err(e);
        }
        let relations = links
            .into_iter()
            .filter_map(|link| {
                let relation_type = link.relation_type().to_string();
                link.uuid.map(|id| (id, relation_type))
            })
            .collect();
        Ok(Some((corrected.into_bytes(), relations)))
    }
}

impl Repository for SqliteRepository {
    fn current_user(&self) -> &str {
        &self.user
    }

    fn current_project(&self) -> &str {
        &self.project
    }

    // ==================
    // Resources
    // ==================

    fn read_resource(&self, path: &str, filter: ResourceFilter) -> Result<Option<Resource>> {
        find_resource(&self.conn, path, filter)
    }

    fn read_resource_by_id(
        &self,
        structure_id: &str,
        filter: ResourceFilter,
    ) -> Result<Option<Resource>> {
        find_resource_by_id(&self.conn, structure_id, filter)
    }

    fn import_resource(
        &mut self,
        record: &ResourceRecord,
        content: Option<&[u8]>,
        properties: &[PropertyValue],
    ) -> Result<Resource> {
        let path = normalize(&record.path);
        let now = now_ms();
        let actor = self.user.clone();
        let configuration = self.is_configuration(&record.type_name);
        let visible_at = self.visible_at(now);

        self.mutate("import_resource", &actor, |tx, ctx| {
            ensure_parents(tx, ctx, &path, now)?;

            let existing = structure_id_at(tx, &path)?;
            let id_free = !record.structure_id.is_empty()
                && find_resource_by_id(tx, &record.structure_id, ResourceFilter::ALL)?.is_none();
            let structure_id = match &existing {
                Some(id) => id.clone(),
                None if id_free => record.structure_id.clone(),
                None => fresh_id(),
            };
            let resource_id = if record.resource_id.is_empty() {
                fresh_id()
            } else {
                record.resource_id.clone()
            };
            let parent = parent_path(&path);
            let user_created = record.user_created.clone().unwrap_or_else(|| actor.clone());
            let user_last_modified = record
                .user_last_modified
                .clone()
                .unwrap_or_else(|| actor.clone());
            let date_created = record.date_created.millis().unwrap_or(now);
            let date_last_modified = record.date_last_modified.millis().unwrap_or(now);
            let date_released = record.date_released.millis().unwrap_or(0);
            let date_expired = record.date_expired.millis().unwrap_or(i64::MAX);
            let params = rusqlite::params![
                structure_id,
                resource_id,
                path,
                parent,
                record.type_name,
                record.is_folder,
                record.flags,
                date_created,
                user_created,
                date_last_modified,
                user_last_modified,
                date_released,
                date_expired,
            ];

            if existing.is_some() {
                tx.execute(
                    "UPDATE resources SET resource_id = ?2, path = ?3, parent_path = ?4,
                        type_name = ?5, is_folder = ?6, flags = ?7,
                        state = CASE state WHEN 'new' THEN 'new' ELSE 'changed' END,
                        date_created = ?8, user_created = ?9, date_last_modified = ?10,
                        user_last_modified = ?11, date_released = ?12, date_expired = ?13
                     WHERE structure_id = ?1",
                    params,
                )?;
                ctx.record_event("resource", &path, EventType::ResourceUpdated);
            } else {
                tx.execute(
                    "INSERT INTO resources (structure_id, resource_id, path, parent_path, type_name,
                        is_folder, flags, state, date_created, user_created, date_last_modified,
                        user_last_modified, date_released, date_expired)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'new', ?8, ?9, ?10, ?11, ?12, ?13)",
                    params,
                )?;
                ctx.record_event("resource", &path, EventType::ResourceCreated);
            }

            if !record.is_folder {
                match content {
                    Some(bytes) => {
                        tx.execute(
                            "INSERT OR REPLACE INTO contents (resource_id, data, sha256, updated_at)
                             VALUES (?1, ?2, ?3, ?4)",
                            rusqlite::params![resource_id, bytes, content_hash(bytes), now],
                        )?;
                    }
                    None => {
                        tx.execute(
                            "INSERT OR IGNORE INTO contents (resource_id, data, sha256, updated_at)
                             VALUES (?1, x'', ?2, ?3)",
                            rusqlite::params![resource_id, content_hash(&[]), now],
                        )?;
                    }
                }
            }

            for prop in properties {
                tx.execute(
                    "INSERT OR IGNORE INTO property_definitions (name, created_at) VALUES (?1, ?2)",
                    rusqlite::params![prop.name, now],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO properties (path, name, structure_value, resource_value)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![path, prop.name, prop.structure_value, prop.resource_value],
                )?;
            }

            if configuration {
                tx.execute(
                    "INSERT OR REPLACE INTO config_queue (path, visible_at) VALUES (?1, ?2)",
                    rusqlite::params![path, visible_at],
                )?;
            }

            find_resource(tx, &path, ResourceFilter::ALL)?
                .ok_or_else(|| Error::ResourceNotFound { path: path.clone() })
        })
    }

    fn read_children(&self, folder: &str, filter: ResourceFilter) -> Result<Vec<Resource>> {
        let sql = format!(
            "{RESOURCE_SELECT} WHERE r.parent_path = ?1{} ORDER BY r.is_folder DESC, r.path",
            deleted_clause(filter)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([normalize(folder)], map_resource)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn read_content(&self, path: &str) -> Result<Vec<u8>> {
        let resource = require_resource(&self.conn, path)?;
        Ok(self
            .conn
            .query_row(
                "SELECT data FROM contents WHERE resource_id = ?1",
                [&resource.resource_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_default())
    }

    fn write_content(&mut self, path: &str, content: &[u8], options: WriteOptions) -> Result<()> {
        let resource = require_resource(&self.conn, path)?;
        self.check_writable(&resource.path)?;

        let corrected = if options.auto_correct_links {
            self.correct_content(content)?
        } else {
            None
        };
        let (bytes, links) = match corrected {
            Some((bytes, links)) => (bytes, Some(links)),
            None => (content.to_vec(), None),
        };

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT sha256 FROM contents WHERE resource_id = ?1",
                [&resource.resource_id],
                |row| row.get(0),
            )
            .optional()?;
        let digest = content_hash(&bytes);
        let changed = has_changed(&digest, stored.as_deref());

        let now = now_ms();
        let actor = self.user.clone();
        let configuration = self.is_configuration(&resource.type_name);
        let visible_at = self.visible_at(now);

        self.mutate("write_content", &actor, |tx, ctx| {
            if changed {
                tx.execute(
                    "INSERT OR REPLACE INTO contents (resource_id, data, sha256, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![resource.resource_id, bytes, digest, now],
                )?;
                tx.execute(
                    "UPDATE resources SET date_last_modified = ?2, user_last_modified = ?3,
                        state = CASE state WHEN 'new' THEN 'new' ELSE 'changed' END
                     WHERE structure_id = ?1",
                    rusqlite::params![resource.structure_id, now, actor],
                )?;
                ctx.record_change(
                    "resource",
                    &resource.path,
                    EventType::ContentWritten,
                    stored,
                    Some(digest.clone()),
                );
                if configuration {
                    tx.execute(
                        "INSERT OR REPLACE INTO config_queue (path, visible_at) VALUES (?1, ?2)",
                        rusqlite::params![resource.path, visible_at],
                    )?;
                }
            }

            if let Some(links) = &links {
                tx.execute(
                    "DELETE FROM relations WHERE source_id = ?1 AND relation_type IN (?2, ?3)",
                    rusqlite::params![resource.structure_id, RELATION_STRONG, RELATION_WEAK],
                )?;
                for (target_id, relation_type) in links {
                    if target_id == &resource.structure_id {
                        continue;
                    }
                    tx.execute(
                        "INSERT OR IGNORE INTO relations (source_id, target_id, relation_type, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![resource.structure_id, target_id, relation_type, now],
                    )?;
                }
            }
            Ok(())
        })
    }

    fn set_date_last_modified(&mut self, path: &str, date: i64) -> Result<()> {
        let path = normalize(path);
        let actor = self.user.clone();
        self.mutate("set_date_last_modified", &actor, |tx, ctx| {
            let updated = tx.execute(
                "UPDATE resources SET date_last_modified = ?2 WHERE path = ?1",
                rusqlite::params![path, date],
            )?;
            if updated == 0 {
                return Err(Error::ResourceNotFound { path: path.clone() });
            }
            ctx.record_change(
                "resource",
                &path,
                EventType::ResourceUpdated,
                None,
                Some(date.to_string()),
            );
            Ok(())
        })
    }

    // ==================
    // Properties
    // ==================

    fn read_properties(&self, path: &str) -> Result<Vec<PropertyValue>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, structure_value, resource_value FROM properties
             WHERE path = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([normalize(path)], |row| {
            Ok(PropertyValue {
                name: row.get(0)?,
                structure_value: row.get(1)?,
                resource_value: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn has_property_definition(&self, name: &str) -> Result<bool> {
        Ok(self
            .conn
            .prepare("SELECT 1 FROM property_definitions WHERE name = ?1")?
            .exists([name])?)
    }

    fn create_property_definition(&mut self, name: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO property_definitions (name, created_at) VALUES (?1, ?2)",
            rusqlite::params![name, now_ms()],
        )?;
        debug!(name, "Created property definition");
        Ok(())
    }

    // ==================
    // Relations
    // ==================

    fn add_relation(&mut self, source: &str, target: &str, relation_type: &str) -> Result<()> {
        let source = require_resource(&self.conn, source)?;
        let target = require_resource(&self.conn, target)?;
        let actor = self.user.clone();
        self.mutate("add_relation", &actor, |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO relations (source_id, target_id, relation_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![source.structure_id, target.structure_id, relation_type, now_ms()],
            )?;
            ctx.record_change(
                "resource",
                &source.path,
                EventType::RelationAdded,
                None,
                Some(format!("{relation_type} -> {}", target.path)),
            );
            Ok(())
        })
    }

    fn read_relations(&self, path: &str) -> Result<Vec<Relation>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.source_id, s.path, r.target_id, t.path, r.relation_type
             FROM relations r
             JOIN resources s ON s.structure_id = r.source_id
             JOIN resources t ON t.structure_id = r.target_id
             WHERE s.path = ?1
             ORDER BY t.path, r.relation_type",
        )?;
        let rows = stmt.query_map([normalize(path)], |row| {
            Ok(Relation {
                source_id: row.get(0)?,
                source_path: row.get(1)?,
                target_id: row.get(2)?,
                target_path: row.get(3)?,
                relation_type: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ==================
    // Access control
    // ==================

    fn read_aces(&self, path: &str) -> Result<Vec<AccessControlEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.principal_id, a.allowed, a.denied, a.flags
             FROM aces a JOIN resources r ON r.structure_id = a.structure_id
             WHERE r.path = ?1
             ORDER BY a.principal_id",
        )?;
        let rows = stmt.query_map([normalize(path)], |row| {
            Ok(AccessControlEntry {
                principal_id: row.get(0)?,
                allowed: row.get(1)?,
                denied: row.get(2)?,
                flags: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn write_aces(&mut self, path: &str, aces: &[AccessControlEntry]) -> Result<()> {
        let resource = require_resource(&self.conn, path)?;
        let actor = self.user.clone();
        self.mutate("write_aces", &actor, |tx, ctx| {
            tx.execute(
                "DELETE FROM aces WHERE structure_id = ?1",
                [&resource.structure_id],
            )?;
            for ace in aces {
                tx.execute(
                    "INSERT OR REPLACE INTO aces (structure_id, principal_id, allowed, denied, flags)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        resource.structure_id,
                        ace.principal_id,
                        ace.allowed,
                        ace.denied,
                        ace.flags
                    ],
                )?;
            }
            ctx.record_change(
                "resource",
                &resource.path,
                EventType::AclWritten,
                None,
                Some(aces.len().to_string()),
            );
            Ok(())
        })
    }

    fn resolve_principal(&self, principal: &PrincipalRef) -> Result<Option<String>> {
        match principal {
            PrincipalRef::Group(name) => group_id(&self.conn, name),
            PrincipalRef::User(name) => user_id(&self.conn, name),
            PrincipalRef::Role(name) => Ok(Some(format!("{ROLE_ID_PREFIX}{name}"))),
            PrincipalRef::AllOthers => Ok(Some(ALL_OTHERS_ID.to_string())),
            PrincipalRef::OverwriteAll => Ok(Some(OVERWRITE_ALL_ID.to_string())),
        }
    }

    fn describe_principal(&self, principal_id: &str) -> Result<Option<PrincipalRef>> {
        if principal_id == ALL_OTHERS_ID {
            return Ok(Some(PrincipalRef::AllOthers));
        }
        if principal_id == OVERWRITE_ALL_ID {
            return Ok(Some(PrincipalRef::OverwriteAll));
        }
        if let Some(role) = principal_id.strip_prefix(ROLE_ID_PREFIX) {
            return Ok(Some(PrincipalRef::Role(role.to_string())));
        }
        let group: Option<String> = self
            .conn
            .query_row("SELECT name FROM groups WHERE id = ?1", [principal_id], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(name) = group {
            return Ok(Some(PrincipalRef::Group(name)));
        }
        let user: Option<String> = self
            .conn
            .query_row("SELECT name FROM users WHERE id = ?1", [principal_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(user.map(PrincipalRef::User))
    }

    // ==================
    // Accounts
    // ==================

    fn read_user(&self, name: &str) -> Result<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE name = ?1");
        let row = self
            .conn
            .query_row(&sql, [name], |row| {
                Ok((
                    User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        password: row.get(2)?,
                        firstname: row.get(3)?,
                        lastname: row.get(4)?,
                        email: row.get(5)?,
                        flags: row.get(6)?,
                        date_created: row.get(7)?,
                        info: BTreeMap::new(),
                        org_unit: row.get(9)?,
                        groups: Vec::new(),
                        roles: Vec::new(),
                    },
                    row.get::<_, String>(8)?,
                ))
            })
            .optional()?;
        let Some((mut user, info)) = row else {
            return Ok(None);
        };
        user.info = serde_json::from_str::<BTreeMap<String, InfoValue>>(&info)?;

        let mut stmt = self.conn.prepare(
            "SELECT g.name FROM group_members m JOIN groups g ON g.id = m.group_id
             WHERE m.user_id = ?1 ORDER BY g.name",
        )?;
        user.groups = stmt
            .query_map([&user.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT role FROM user_roles WHERE user_id = ?1 ORDER BY role")?;
        user.roles = stmt
            .query_map([&user.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Some(user))
    }

    fn read_users(&self, org_unit: &str) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM users WHERE org_unit = ?1 ORDER BY name")?;
        let names = stmt
            .query_map([normalize_org_unit(org_unit)], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        let mut users = Vec::with_capacity(names.len());
        for name in names {
            if let Some(user) = self.read_user(&name)? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn create_user(&mut self, user: &User) -> Result<User> {
        let org_unit = normalize_org_unit(&user.org_unit);
        if !org_unit_exists(&self.conn, &org_unit)? {
            return Err(Error::PrincipalNotFound { name: org_unit });
        }
        let id = if user.id.is_empty() || id_taken(&self.conn, "users", &user.id)? {
            fresh_id()
        } else {
            user.id.clone()
        };
        let info = serde_json::to_string(&user.info)?;
        let actor = self.user.clone();
        self.mutate("create_user", &actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO users (id, name, password, firstname, lastname, email, flags,
                    date_created, info, org_unit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    id,
                    user.name,
                    user.password,
                    user.firstname,
                    user.lastname,
                    user.email,
                    user.flags,
                    user.date_created,
                    info,
                    org_unit,
                ],
            )?;
            ctx.record_event("user", &user.name, EventType::UserCreated);
            Ok(())
        })?;
        self.read_user(&user.name)?
            .ok_or_else(|| Error::PrincipalNotFound {
                name: user.name.clone(),
            })
    }

    fn read_group(&self, name: &str) -> Result<Option<Group>> {
        let sql = format!("{GROUP_SELECT} WHERE g.name = ?1");
        Ok(self.conn.query_row(&sql, [name], map_group).optional()?)
    }

    fn read_groups(&self, org_unit: &str) -> Result<Vec<Group>> {
        let sql = format!("{GROUP_SELECT} WHERE g.org_unit = ?1 ORDER BY g.name");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([normalize_org_unit(org_unit)], map_group)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn create_group(&mut self, group: &Group) -> Result<Group> {
        let org_unit = normalize_org_unit(&group.org_unit);
        if !org_unit_exists(&self.conn, &org_unit)? {
            return Err(Error::PrincipalNotFound { name: org_unit });
        }
        let parent_id = match &group.parent {
            Some(parent) => Some(require_group_id(&self.conn, parent)?),
            None => None,
        };
        let id = if group.id.is_empty() || id_taken(&self.conn, "groups", &group.id)? {
            fresh_id()
        } else {
            group.id.clone()
        };
        let actor = self.user.clone();
        self.mutate("create_group", &actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO groups (id, name, description, flags, parent_id, org_unit, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    group.name,
                    group.description,
                    group.flags,
                    parent_id,
                    org_unit,
                    now_ms()
                ],
            )?;
            ctx.record_event("group", &group.name, EventType::GroupCreated);
            Ok(())
        })?;
        self.read_group(&group.name)?
            .ok_or_else(|| Error::PrincipalNotFound {
                name: group.name.clone(),
            })
    }

    fn set_parent_group(&mut self, child: &str, parent: &str) -> Result<()> {
        let child_id = require_group_id(&self.conn, child)?;
        let parent_id = require_group_id(&self.conn, parent)?;
        let actor = self.user.clone();
        self.mutate("set_parent_group", &actor, |tx, ctx| {
            tx.execute(
                "UPDATE groups SET parent_id = ?2 WHERE id = ?1",
                rusqlite::params![child_id, parent_id],
            )?;
            ctx.record_change(
                "group",
                child,
                EventType::GroupParentSet,
                None,
                Some(parent.to_string()),
            );
            Ok(())
        })
    }

    fn add_user_to_group(&mut self, user: &str, group: &str) -> Result<()> {
        let user_id = require_user_id(&self.conn, user)?;
        let group_id = require_group_id(&self.conn, group)?;
        let actor = self.user.clone();
        self.mutate("add_user_to_group", &actor, |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![group_id, user_id],
            )?;
            ctx.record_change("user", user, EventType::MembershipAdded, None, Some(group.to_string()));
            Ok(())
        })
    }

    fn add_user_to_role(&mut self, user: &str, role: &str) -> Result<()> {
        let user_id = require_user_id(&self.conn, user)?;
        let actor = self.user.clone();
        self.mutate("add_user_to_role", &actor, |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
                rusqlite::params![user_id, role],
            )?;
            ctx.record_change("user", user, EventType::RoleAdded, None, Some(role.to_string()));
            Ok(())
        })
    }

    fn read_org_unit(&self, name: &str) -> Result<Option<OrgUnit>> {
        let name = normalize_org_unit(name);
        let unit = self
            .conn
            .query_row(
                "SELECT name, description, flags FROM org_units WHERE name = ?1",
                [&name],
                |row| {
                    Ok(OrgUnit {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        flags: row.get(2)?,
                        resources: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut unit) = unit else {
            return Ok(None);
        };
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM org_unit_resources WHERE org_unit = ?1 ORDER BY path")?;
        unit.resources = stmt
            .query_map([&name], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(unit))
    }

    fn read_org_units(&self) -> Result<Vec<OrgUnit>> {
        let mut stmt = self.conn.prepare("SELECT name FROM org_units ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        let mut units = Vec::with_capacity(names.len());
        for name in names {
            if let Some(unit) = self.read_org_unit(&name)? {
                units.push(unit);
            }
        }
        Ok(units)
    }

    fn create_org_unit(&mut self, org_unit: &OrgUnit, initial_resource: &str) -> Result<()> {
        let name = normalize_org_unit(&org_unit.name);
        if let Some(parent) = crate::model::principal::parent_org_unit(&name) {
            if !org_unit_exists(&self.conn, &parent)? {
                return Err(Error::PrincipalNotFound { name: parent });
            }
        }
        let resource = require_resource(&self.conn, initial_resource)?;
        let actor = self.user.clone();
        self.mutate("create_org_unit", &actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO org_units (name, description, flags, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![name, org_unit.description, org_unit.flags, now_ms()],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO org_unit_resources (org_unit, path) VALUES (?1, ?2)",
                rusqlite::params![name, resource.path],
            )?;
            ctx.record_event("orgunit", &name, EventType::OrgUnitCreated);
            Ok(())
        })
    }

    fn add_resource_to_org_unit(&mut self, org_unit: &str, path: &str) -> Result<()> {
        let name = normalize_org_unit(org_unit);
        if !org_unit_exists(&self.conn, &name)? {
            return Err(Error::PrincipalNotFound { name });
        }
        let resource = require_resource(&self.conn, path)?;
        let actor = self.user.clone();
        self.mutate("add_resource_to_org_unit", &actor, |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO org_unit_resources (org_unit, path) VALUES (?1, ?2)",
                rusqlite::params![name, resource.path],
            )?;
            ctx.record_change(
                "orgunit",
                &name,
                EventType::OrgUnitResourceAdded,
                None,
                Some(resource.path.clone()),
            );
            Ok(())
        })
    }

    fn remove_resource_from_org_unit(&mut self, org_unit: &str, path: &str) -> Result<()> {
        let name = normalize_org_unit(org_unit);
        if !org_unit_exists(&self.conn, &name)? {
            return Err(Error::PrincipalNotFound { name });
        }
        let path = normalize(path);
        let actor = self.user.clone();
        self.mutate("remove_resource_from_org_unit", &actor, |tx, ctx| {
            tx.execute(
                "DELETE FROM org_unit_resources WHERE org_unit = ?1 AND path = ?2",
                rusqlite::params![name, path],
            )?;
            ctx.record_change(
                "orgunit",
                &name,
                EventType::OrgUnitResourceRemoved,
                Some(path.clone()),
                None,
            );
            Ok(())
        })
    }

    fn read_project(&self, name: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, description, users_group, managers_group, created_at
                 FROM projects WHERE name = ?1",
                [name],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        users_group: row.get(3)?,
                        managers_group: row.get(4)?,
                        resources: Vec::new(),
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        let Some(mut project) = project else {
            return Ok(None);
        };
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM project_resources WHERE project_id = ?1 ORDER BY path")?;
        project.resources = stmt
            .query_map([&project.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Some(project))
    }

    fn read_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare("SELECT name FROM projects ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        let mut projects = Vec::with_capacity(names.len());
        for name in names {
            if let Some(project) = self.read_project(&name)? {
                projects.push(project);
            }
        }
        Ok(projects)
    }

    fn create_project(&mut self, project: &Project) -> Result<Project> {
        require_group_id(&self.conn, &project.users_group)?;
        require_group_id(&self.conn, &project.managers_group)?;
        let id = if project.id.is_empty() || id_taken(&self.conn, "projects", &project.id)? {
            fresh_id()
        } else {
            project.id.clone()
        };
        let created_at = if project.created_at > 0 {
            project.created_at
        } else {
            now_ms()
        };
        let actor = self.user.clone();
        self.mutate("create_project", &actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO projects (id, name, description, users_group, managers_group, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id,
                    project.name,
                    project.description,
                    project.users_group,
                    project.managers_group,
                    created_at
                ],
            )?;
            ctx.record_event("project", &project.name, EventType::ProjectCreated);
            Ok(())
        })?;
        self.read_project(&project.name)?
            .ok_or_else(|| Error::PrincipalNotFound {
                name: project.name.clone(),
            })
    }

    fn add_resource_to_project(&mut self, project: &str, path: &str) -> Result<()> {
        let project_id: String = self
            .conn
            .query_row("SELECT id FROM projects WHERE name = ?1", [project], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| Error::PrincipalNotFound {
                name: project.to_string(),
            })?;
        let resource = require_resource(&self.conn, path)?;
        let actor = self.user.clone();
        self.mutate("add_resource_to_project", &actor, |tx, ctx| {
            tx.execute(
                "INSERT OR IGNORE INTO project_resources (project_id, path) VALUES (?1, ?2)",
                rusqlite::params![project_id, resource.path],
            )?;
            ctx.record_change(
                "project",
                project,
                EventType::ProjectResourceAdded,
                None,
                Some(resource.path.clone()),
            );
            Ok(())
        })
    }

    // ==================
    // Locks
    // ==================

    fn lock_state(&self, path: &str) -> Result<LockState> {
        let lock: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT owner, project FROM locks WHERE path = ?1",
                [normalize(path)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match lock {
            Some((owner, project)) => LockState::Exclusive { owner, project },
            None => LockState::Unlocked,
        })
    }

    fn lock(&mut self, path: &str) -> Result<()> {
        let resource = require_resource(&self.conn, path)?;
        if let LockState::Exclusive { owner, .. } = self.lock_state(&resource.path)? {
            return Err(Error::Locked {
                path: resource.path,
                owner,
            });
        }
        let actor = self.user.clone();
        let project = self.project.clone();
        self.mutate("lock", &actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO locks (path, owner, project, locked_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![resource.path, actor, project, now_ms()],
            )?;
            ctx.record_event("resource", &resource.path, EventType::Locked);
            Ok(())
        })
    }

    fn change_lock(&mut self, path: &str) -> Result<()> {
        let path = normalize(path);
        let (owner, project) = match self.lock_state(&path)? {
            LockState::Exclusive { owner, project } => (owner, project),
            LockState::Unlocked => return self.lock(&path),
        };
        if project != self.project {
            return Err(Error::Locked { path, owner });
        }
        let actor = self.user.clone();
        self.mutate("change_lock", &actor, |tx, ctx| {
            tx.execute(
                "UPDATE locks SET owner = ?2, locked_at = ?3 WHERE path = ?1",
                rusqlite::params![path, actor, now_ms()],
            )?;
            ctx.record_change("resource", &path, EventType::LockChanged, Some(owner), Some(actor.clone()));
            Ok(())
        })
    }

    fn unlock(&mut self, path: &str) -> Result<()> {
        let path = normalize(path);
        match self.lock_state(&path)? {
            LockState::Unlocked => Ok(()),
            LockState::Exclusive { owner, .. } if owner != self.user => {
                Err(Error::Locked { path, owner })
            }
            LockState::Exclusive { .. } => {
                let actor = self.user.clone();
                self.mutate("unlock", &actor, |tx, ctx| {
                    tx.execute("DELETE FROM locks WHERE path = ?1", [&path])?;
                    ctx.record_event("resource", &path, EventType::Unlocked);
                    Ok(())
                })
            }
        }
    }

    fn configuration_converged(&mut self) -> Result<bool> {
        self.conn
            .execute("DELETE FROM config_queue WHERE visible_at <= ?1", [now_ms()])?;
        let pending: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM config_queue", [], |row| row.get(0))?;
        Ok(pending == 0)
    }
}

fn map_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        flags: row.get(3)?,
        parent: row.get(4)?,
        org_unit: row.get(5)?,
    })
}
