//! Create the repository database.
//!
//! The database lives at `~/.cmsport/data/repository.db` unless `--db` or
//! `CMSPORT_DB` points elsewhere. Opening it applies the schema and seeds
//! the root folder and root org unit.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::repository::SqliteRepository;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    created: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the database exists and `force`
/// is not set, or an error if it cannot be created.
pub fn execute(db: Option<&Path>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db)
        .ok_or_else(|| Error::Config("Could not determine the cmsport directory".to_string()))?;

    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized { path: db_path });
        }
        fs::remove_file(&db_path)?;
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    SqliteRepository::open(&db_path)?;

    if json {
        let output = InitOutput {
            database: db_path,
            created: true,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized repository at {}", db_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_existing_database() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("data").join("repository.db");

        execute(Some(&db), false, true).unwrap();
        assert!(db.exists());

        let err = execute(Some(&db), false, true).unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized { .. }));

        execute(Some(&db), true, true).unwrap();
    }
}
