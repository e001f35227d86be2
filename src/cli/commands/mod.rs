//! Command implementations.

pub mod completions;
pub mod export;
pub mod import;
pub mod info;
pub mod init;
pub mod version;

use std::path::Path;

use tracing::debug;

use crate::config::{TransferConfig, default_actor, resolve_config_path, resolve_db_path};
use crate::error::{Error, Result};
use crate::manager::ArchiveManager;
use crate::model::project::ONLINE_PROJECT;
use crate::repository::SqliteRepository;

/// Global options every repository command needs.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub db: Option<&'a Path>,
    pub config: Option<&'a Path>,
    pub actor: Option<&'a str>,
    pub json: bool,
    pub quiet: bool,
}

impl Context<'_> {
    /// Transfer settings, defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the settings file cannot be parsed.
    pub fn load_config(&self) -> Result<TransferConfig> {
        match resolve_config_path(self.config) {
            Some(path) => TransferConfig::load(&path),
            None => Ok(TransferConfig::default()),
        }
    }

    /// Open the initialized repository and wrap it in a manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the database does not exist.
    pub fn open_manager(&self) -> Result<ArchiveManager<SqliteRepository>> {
        let db_path = resolve_db_path(self.db).ok_or(Error::NotInitialized)?;
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }
        let config = self.load_config()?;
        let actor = self.actor.map_or_else(default_actor, str::to_string);
        debug!(db = %db_path.display(), actor = %actor, "Opening repository");

        let repository = SqliteRepository::open(&db_path)?
            .with_context(&actor, ONLINE_PROJECT)
            .with_configuration_types(
                config.link_types.configuration.clone(),
                config.config_propagation(),
            );
        Ok(ArchiveManager::new(repository, config))
    }
}
