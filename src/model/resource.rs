//! Resource records and timestamps.
//!
//! A resource has two identities: the structure id names one placement in the
//! tree, the resource id names the shared content behind it. Siblings are
//! placements that share a resource id.

use serde::{Deserialize, Serialize};

/// Release date used when an archive does not declare one.
pub const DATE_RELEASED_DEFAULT: i64 = 0;

/// Expiration date meaning "never expires".
pub const DATE_EXPIRED_DEFAULT: i64 = i64::MAX;

/// Resource flag: the resource is only reachable through internal links.
pub const FLAG_INTERNAL: u32 = 512;

/// Resource flag: the resource carries a label from a sibling.
pub const FLAG_LABELED: u32 = 2;

/// Type name the repository uses for plain folders.
pub const FOLDER_TYPE: &str = "folder";

/// A timestamp as carried by an archive.
///
/// Besides literal values, newer manifests can ask the importer to take the
/// modification time of the archive entry or the moment of the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateValue {
    /// Milliseconds since the Unix epoch.
    At(i64),
    /// Use the last-modified time of the archive entry holding the content.
    FileTime,
    /// Use the time the import operation started.
    ImportTime,
}

impl DateValue {
    /// Resolve to a concrete timestamp.
    ///
    /// `FileTime` falls back to `import_time` when the archive cannot tell
    /// (folders, missing entries, containers without timestamps).
    #[must_use]
    pub fn resolve(self, file_time: Option<i64>, import_time: i64) -> i64 {
        match self {
            Self::At(ms) => ms,
            Self::FileTime => file_time.unwrap_or(import_time),
            Self::ImportTime => import_time,
        }
    }

    /// The literal value, if this is not a macro.
    #[must_use]
    pub const fn millis(self) -> Option<i64> {
        match self {
            Self::At(ms) => Some(ms),
            Self::FileTime | Self::ImportTime => None,
        }
    }
}

/// Lifecycle state of a live resource, used by export filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Unchanged,
    Changed,
    New,
    Deleted,
}

impl ResourceState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::New => "new",
            Self::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unchanged" => Ok(Self::Unchanged),
            "changed" => Ok(Self::Changed),
            "new" => Ok(Self::New),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Unknown resource state: {s}")),
        }
    }
}

/// The immutable record built from one archive entry, handed to the
/// repository for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub structure_id: String,
    pub resource_id: String,
    /// Absolute destination path in the repository.
    pub path: String,
    pub type_name: String,
    pub is_folder: bool,
    pub flags: u32,
    pub date_created: DateValue,
    pub user_created: Option<String>,
    pub date_last_modified: DateValue,
    pub user_last_modified: Option<String>,
    pub date_released: DateValue,
    pub date_expired: DateValue,
    pub content_length: u64,
    pub sibling_count: u32,
}

impl ResourceRecord {
    /// Replace every date macro with a literal timestamp.
    pub fn resolve_dates(&mut self, file_time: Option<i64>, import_time: i64) {
        self.date_created = DateValue::At(self.date_created.resolve(file_time, import_time));
        self.date_last_modified =
            DateValue::At(self.date_last_modified.resolve(file_time, import_time));
        self.date_released = DateValue::At(self.date_released.resolve(file_time, import_time));
        self.date_expired = DateValue::At(self.date_expired.resolve(file_time, import_time));
    }
}

/// A resource as it exists in the live repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub structure_id: String,
    pub resource_id: String,
    pub path: String,
    pub type_name: String,
    pub is_folder: bool,
    pub flags: u32,
    pub state: ResourceState,
    pub date_created: i64,
    pub user_created: String,
    pub date_last_modified: i64,
    pub user_last_modified: String,
    pub date_released: i64,
    pub date_expired: i64,
    pub content_length: u64,
    pub sibling_count: u32,
}

/// Join a base path with a relative archive path.
///
/// The result always starts with `/`, never contains empty segments, and
/// keeps a trailing slash only for the root.
#[must_use]
pub fn join_path(base: &str, relative: &str) -> String {
    let segments: Vec<&str> = base
        .split('/')
        .chain(relative.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent folder of an absolute path, or `None` for the root.
#[must_use]
pub fn parent_path(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
        None => None,
    }
}

/// Strip `base` from `path`, producing the relative form stored in manifests.
#[must_use]
pub fn relative_to(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let stripped = path.strip_prefix(base).unwrap_or(path);
    stripped.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_value_resolution() {
        assert_eq!(DateValue::At(5).resolve(Some(10), 20), 5);
        assert_eq!(DateValue::FileTime.resolve(Some(10), 20), 10);
        assert_eq!(DateValue::FileTime.resolve(None, 20), 20);
        assert_eq!(DateValue::ImportTime.resolve(Some(10), 20), 20);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a.html"), "/a.html");
        assert_eq!(join_path("/sites/default/", "/b/c.html"), "/sites/default/b/c.html");
        assert_eq!(join_path("/", ""), "/");
        assert_eq!(join_path("/x", "./y//z/"), "/x/y/z");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/b/c.html").as_deref(), Some("/b"));
        assert_eq!(parent_path("/b").as_deref(), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("/sites/default", "/sites/default/a/b.html"), "a/b.html");
        assert_eq!(relative_to("/", "/a.html"), "a.html");
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            ResourceState::Unchanged,
            ResourceState::Changed,
            ResourceState::New,
            ResourceState::Deleted,
        ] {
            assert_eq!(state.as_str().parse::<ResourceState>().unwrap(), state);
        }
    }
}
