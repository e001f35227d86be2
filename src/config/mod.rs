//! Configuration management.
//!
//! This module resolves where things live and loads the transfer settings.
//!
//! # Layout
//!
//! Everything defaults to a single directory in the user's home:
//! - **Database**: `~/.cmsport/data/repository.db`
//! - **Settings**: `~/.cmsport/config.json` (see [`TransferConfig`])
//!
//! Both can be redirected with a CLI flag or an environment variable.

mod transfer;

pub use transfer::{ConvergenceConfig, LinkTypes, TransferConfig};

use std::path::{Path, PathBuf};

use crate::repository::sqlite::DEFAULT_USER;

/// Environment variable overriding the database path.
pub const DB_ENV: &str = "CMSPORT_DB";

/// Environment variable overriding the settings file.
pub const CONFIG_ENV: &str = "CMSPORT_CONFIG";

/// Environment variable naming the repository user to act as.
pub const ACTOR_ENV: &str = "CMSPORT_ACTOR";

/// Get the global cmsport directory, `~/.cmsport/`.
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cmsport"))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CMSPORT_DB` environment variable
/// 3. Global location: `~/.cmsport/data/repository.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    env_path(DB_ENV).or_else(|| global_dir().map(|dir| dir.join("data").join("repository.db")))
}

/// Resolve the settings file path: explicit, `CMSPORT_CONFIG`, then
/// `~/.cmsport/config.json`.
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    env_path(CONFIG_ENV).or_else(|| global_dir().map(|dir| dir.join("config.json")))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `CMSPORT_ACTOR` environment variable
/// 2. The repository's built-in administrator
#[must_use]
pub fn default_actor() -> String {
    std::env::var(ACTOR_ENV)
        .ok()
        .filter(|actor| !actor.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actor() {
        let actor = default_actor();
        assert!(!actor.is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_config_path_with_explicit() {
        let explicit = PathBuf::from("/custom/cmsport.json");
        assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_global_dir_returns_some() {
        let result = global_dir();
        assert!(result.is_some_and(|dir| dir.ends_with(".cmsport")));
    }
}
